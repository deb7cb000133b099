//! Map build requests, lifecycle stages, and the geometry derived from a
//! map's neighbors (fall regions and the bounds plane).

use crate::map::{BoundsPlane, FallRegion, Map};
use crate::map_data::{Layer, MapData};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameMode {
    /// Lifecycle scripts, memory and visibility bookkeeping all run.
    #[default]
    Game,
    /// Geometry only.
    Editor,
}

/// Options for one `build_map_on_layer_by_name` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRequest {
    pub layer: Layer,
    pub mode: GameMode,
    pub ignore_adjacent: bool,
}

impl BuildRequest {
    pub fn new(layer: Layer, mode: GameMode) -> Self {
        Self {
            layer,
            mode,
            ignore_adjacent: false,
        }
    }

    pub fn editor(layer: Layer) -> Self {
        Self::new(layer, GameMode::Editor)
    }

    /// Build only the named map; a foreground build also drops every other
    /// cached foreground map.
    pub fn without_adjacent(mut self) -> Self {
        self.ignore_adjacent = true;
        self
    }
}

/// Steps a freshly instantiated map walks through in game mode, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleStage {
    GlobalOnLoad,
    OnLoad,
    OnBirth,
    Memory,
    LoadComplete,
    Visible,
}

impl LifecycleStage {
    pub const ORDER: [LifecycleStage; 6] = [
        LifecycleStage::GlobalOnLoad,
        LifecycleStage::OnLoad,
        LifecycleStage::OnBirth,
        LifecycleStage::Memory,
        LifecycleStage::LoadComplete,
        LifecycleStage::Visible,
    ];

    pub fn next(self) -> Option<Self> {
        let index = Self::ORDER.iter().position(|stage| *stage == self)?;
        Self::ORDER.get(index + 1).copied()
    }

    /// Script run at this stage, if any. `OnBirth` only runs for maps that
    /// have never been visited.
    pub fn script_name(self) -> Option<&'static str> {
        match self {
            LifecycleStage::GlobalOnLoad => Some("global.map.onload"),
            LifecycleStage::OnLoad => Some("onload"),
            LifecycleStage::OnBirth => Some("onbirth"),
            LifecycleStage::LoadComplete => Some("global.map.load.complete"),
            LifecycleStage::Memory | LifecycleStage::Visible => None,
        }
    }
}

/// Columns in `[-1, width + 1)` beneath `map` with no neighbor sitting flush
/// below, merged into the fewest contiguous runs.
pub fn compute_fall_regions<'a, I>(map: &MapData, neighbors: I) -> Vec<FallRegion>
where
    I: IntoIterator<Item = &'a MapData>,
{
    let first = -1;
    let span = (map.width + 2).max(0) as usize;
    let mut open = vec![true; span];
    let y_below = map.y + map.height;

    for neighbor in neighbors {
        if neighbor.name == map.name || neighbor.y != y_below {
            continue;
        }
        let offset = neighbor.x - map.x;
        for column in offset..offset + neighbor.width {
            let index = column - first;
            if index >= 0 && (index as usize) < span {
                open[index as usize] = false;
            }
        }
    }

    let mut regions = Vec::new();
    let mut run: Option<FallRegion> = None;
    for (index, is_open) in open.iter().enumerate() {
        let column = first + index as i32;
        if *is_open {
            match run.as_mut() {
                Some(region) => region.width += 1,
                None => {
                    run = Some(FallRegion {
                        start: column,
                        width: 1,
                    })
                }
            }
        } else if let Some(region) = run.take() {
            regions.push(region);
        }
    }
    regions.extend(run);
    regions
}

/// Collision plane for `map` whose border copies the facing edge of every
/// neighbor separated by fewer than `boundary` tiles. Neighbor rows and
/// columns are copied only within `[-1, size + 1)` along the shared edge.
pub fn build_bounds_plane<'a, I>(map: &Map, neighbors: I, boundary: i32) -> BoundsPlane
where
    I: IntoIterator<Item = &'a Map>,
{
    let (width, height) = (map.width(), map.height());
    let mut plane = BoundsPlane::new(width, height, boundary);
    for y in 0..height {
        for x in 0..width {
            plane.set(x, y, map.tile(x, y));
        }
    }

    for neighbor in neighbors {
        if neighbor.name == map.name {
            continue;
        }
        let rel_x = neighbor.x - map.x;
        let rel_y = neighbor.y - map.y;

        let left_gap = -rel_x - neighbor.width();
        if (0..boundary).contains(&left_gap) {
            for depth in 0..boundary {
                for y in -1..height + 1 {
                    let source = (neighbor.width() - 1 - depth, y - rel_y);
                    copy_cell(&mut plane, neighbor, source, (-1 - depth, y));
                }
            }
        }

        let right_gap = rel_x - width;
        if (0..boundary).contains(&right_gap) {
            for depth in 0..boundary {
                for y in -1..height + 1 {
                    copy_cell(&mut plane, neighbor, (depth, y - rel_y), (width + depth, y));
                }
            }
        }

        let top_gap = -rel_y - neighbor.height();
        if (0..boundary).contains(&top_gap) {
            for depth in 0..boundary {
                for x in -1..width + 1 {
                    let source = (x - rel_x, neighbor.height() - 1 - depth);
                    copy_cell(&mut plane, neighbor, source, (x, -1 - depth));
                }
            }
        }

        let bottom_gap = rel_y - height;
        if (0..boundary).contains(&bottom_gap) {
            for depth in 0..boundary {
                for x in -1..width + 1 {
                    copy_cell(&mut plane, neighbor, (x - rel_x, depth), (x, height + depth));
                }
            }
        }
    }
    plane
}

fn copy_cell(plane: &mut BoundsPlane, neighbor: &Map, source: (i32, i32), target: (i32, i32)) {
    let (sx, sy) = source;
    if sx < 0 || sy < 0 || sx >= neighbor.width() || sy >= neighbor.height() {
        return;
    }
    plane.set(target.0, target.1, neighbor.tile(sx, sy));
}
