use std::collections::BTreeMap;

use tracing::debug;

use crate::camera::Camera;
use crate::config::UniverseConfig;
use crate::geometry::Rect;
use crate::map_data::MapData;

/// `map name -> names of related maps`, in map-name order.
pub type AdjacencyGraph = BTreeMap<String, Vec<String>>;

/// Region the camera may cover while `data` is the active foreground map:
/// the map's pixel rectangle padded by the perimeter scroll, then widened
/// symmetrically up to at least one viewport.
pub fn camera_region(data: &MapData, config: &UniverseConfig) -> Rect {
    let mut region = data.pixel_rect(config).offset(
        -config.max_perimeter_scroll_x,
        -config.max_perimeter_scroll_y,
        2 * config.max_perimeter_scroll_x,
        2 * config.max_perimeter_scroll_y,
    );
    if region.w < config.screen_width {
        let spare = config.screen_width - region.w;
        region = region.offset(-(spare / 2), 0, spare, 0);
    }
    if region.h < config.screen_height {
        let spare = config.screen_height - region.h;
        region = region.offset(0, -(spare / 2), 0, spare);
    }
    region
}

/// For every map A, lists each other map B whose raw pixel rectangle
/// intersects A's camera region. Only A is padded.
pub fn calculate_adjacency(maps: &BTreeMap<String, MapData>, config: &UniverseConfig) -> AdjacencyGraph {
    let mut graph = AdjacencyGraph::new();
    for (name, data) in maps {
        let padded = camera_region(data, config);
        let neighbors = maps
            .iter()
            .filter(|(other_name, _)| *other_name != name)
            .filter(|(_, other)| padded.intersects(&other.pixel_rect(config)))
            .map(|(other_name, _)| other_name.clone())
            .collect::<Vec<_>>();
        graph.insert(name.clone(), neighbors);
    }
    graph
}

/// For every foreground map, lists the background maps that can appear
/// behind it while the camera roams its camera region.
pub fn calculate_parallax(
    foreground: &BTreeMap<String, MapData>,
    background: &BTreeMap<String, MapData>,
    config: &UniverseConfig,
) -> AdjacencyGraph {
    let parallax = config.background_map_parallax_scale;
    let scale = config.background_map_scale;

    let mut graph = AdjacencyGraph::new();
    for (name, data) in foreground {
        let perimeter = camera_region(data, config);
        let reach = perimeter.offset(
            0,
            0,
            (perimeter.w as f32 / parallax) as i32 - perimeter.w,
            (perimeter.h as f32 / parallax) as i32 - perimeter.h,
        );
        let (px, py) = Camera::parallax_offsets_at_location(perimeter.x, perimeter.y, parallax);

        let visible = background
            .iter()
            .filter(|(_, back)| {
                let scaled = Rect::new(
                    (back.x as f32 * config.tile_width as f32 * scale) as i32,
                    (back.y as f32 * config.tile_height as f32 * scale) as i32,
                    (back.width as f32 * config.tile_width as f32 * scale) as i32,
                    (back.height as f32 * config.tile_height as f32 * scale) as i32,
                );
                scaled.translate(-px, -py).intersects(&reach)
            })
            .map(|(back_name, _)| back_name.clone())
            .collect::<Vec<_>>();
        graph.insert(name.clone(), visible);
    }
    graph
}

/// Precomputed adjacency and parallax relationships for one universe.
/// Rebuilt at load and whenever a map is added; never per frame.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyEngine {
    foreground: AdjacencyGraph,
    parallax: AdjacencyGraph,
}

impl AdjacencyEngine {
    pub fn rebuild(
        &mut self,
        foreground: &mut BTreeMap<String, MapData>,
        background: &BTreeMap<String, MapData>,
        config: &UniverseConfig,
    ) {
        self.foreground = calculate_adjacency(foreground, config);
        self.parallax = calculate_parallax(foreground, background, config);

        for (name, data) in foreground.iter_mut() {
            data.clear_adjacency();
            data.clear_parallax();
            for neighbor in self.adjacent(name) {
                data.add_adjacent_map(neighbor);
            }
            for back in self.parallax_maps(name) {
                data.add_parallax_map(back);
            }
        }

        debug!(
            foreground_maps = foreground.len(),
            background_maps = background.len(),
            "adjacency_rebuilt"
        );
    }

    pub fn adjacent(&self, name: &str) -> &[String] {
        self.foreground.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        self.adjacent(from).iter().any(|name| name == to)
    }

    pub fn parallax_maps(&self, name: &str) -> &[String] {
        self.parallax.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn foreground_graph(&self) -> &AdjacencyGraph {
        &self.foreground
    }

    pub fn clear(&mut self) {
        self.foreground.clear();
        self.parallax.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(name: &str, x: i32, y: i32, width: i32, height: i32) -> MapData {
        let mut data = MapData::new(name);
        data.x = x;
        data.y = y;
        data.width = width;
        data.height = height;
        data
    }

    fn layer(maps: Vec<MapData>) -> BTreeMap<String, MapData> {
        maps.into_iter()
            .map(|data| (data.name.clone(), data))
            .collect()
    }

    #[test]
    fn flush_neighbors_are_mutually_adjacent() {
        let config = UniverseConfig::default();
        let maps = layer(vec![map("a", 0, 0, 10, 10), map("b", 10, 0, 10, 10)]);
        let graph = calculate_adjacency(&maps, &config);
        assert_eq!(graph["a"], vec!["b".to_string()]);
        assert_eq!(graph["b"], vec!["a".to_string()]);
    }

    #[test]
    fn distant_maps_are_not_adjacent_and_self_is_excluded() {
        let config = UniverseConfig::default();
        let maps = layer(vec![map("a", 0, 0, 40, 30), map("far", 200, 0, 40, 30)]);
        let graph = calculate_adjacency(&maps, &config);
        assert!(graph["a"].is_empty());
        assert!(graph["far"].is_empty());
    }

    #[test]
    fn adjacency_is_symmetric_over_grid() {
        let config = UniverseConfig::default();
        let mut maps = Vec::new();
        for row in 0..4 {
            for col in 0..5 {
                let gap = if col % 2 == 0 { 0 } else { 1 };
                maps.push(map(
                    &format!("m{row}_{col}"),
                    col * 30 + gap,
                    row * 22,
                    30,
                    22,
                ));
            }
        }
        let maps = layer(maps);
        let graph = calculate_adjacency(&maps, &config);
        for (name, neighbors) in &graph {
            assert!(!neighbors.contains(name), "{name} adjacent to itself");
            for neighbor in neighbors {
                assert!(
                    graph[neighbor].contains(name),
                    "{name} -> {neighbor} not mirrored"
                );
            }
        }
        assert!(graph["m1_1"].contains(&"m1_2".to_string()));
        assert!(graph["m1_1"].contains(&"m2_1".to_string()));
    }

    #[test]
    fn small_maps_reach_a_full_viewport() {
        let config = UniverseConfig::default();
        let tiny = map("tiny", 10, 10, 4, 4);
        let region = camera_region(&tiny, &config);
        assert!(region.w >= config.screen_width);
        assert!(region.h >= config.screen_height);

        let maps = layer(vec![tiny, map("nearby", 22, 10, 4, 4)]);
        let graph = calculate_adjacency(&maps, &config);
        assert_eq!(graph["tiny"], vec!["nearby".to_string()]);
    }

    #[test]
    fn parallax_picks_background_under_camera_reach() {
        let config = UniverseConfig::default();
        let foreground = layer(vec![map("town", 0, 0, 30, 20)]);
        let background = layer(vec![
            map("sky", 0, 0, 40, 30),
            map("elsewhere", 1000, 1000, 10, 10),
        ]);
        let graph = calculate_parallax(&foreground, &background, &config);
        assert_eq!(graph["town"], vec!["sky".to_string()]);
    }

    #[test]
    fn engine_rebuild_populates_map_data_lists() {
        let config = UniverseConfig::default();
        let mut foreground = layer(vec![map("a", 0, 0, 10, 10), map("b", 10, 0, 10, 10)]);
        let background = layer(vec![map("sky", 0, 0, 40, 30)]);
        let mut engine = AdjacencyEngine::default();
        engine.rebuild(&mut foreground, &background, &config);
        assert!(engine.is_adjacent("a", "b"));
        assert_eq!(foreground["a"].adjacent_maps(), ["b".to_string()]);
        assert_eq!(foreground["b"].parallax_maps(), ["sky".to_string()]);
        assert!(engine.adjacent("missing").is_empty());
    }
}
