use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::geometry::Rect;
use crate::map::{Genus, Map, MapEntity, Trigger};
use crate::map_data::MapData;
use crate::tree::{TreeError, TreeNode, TreeStore, XmlTreeStore};

#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("map {map} has a non-numeric tile {value:?} at row {row}, column {column}")]
    BadTile {
        map: String,
        row: usize,
        column: usize,
        value: String,
    },
}

/// Produces live maps for MapData records.
pub trait MapSource {
    fn load_map(&self, data: &MapData) -> Result<Map, MapLoadError>;
}

/// Reads `<maps_dir>/<name>.xml`. A missing file yields an empty map of the
/// recorded size.
#[derive(Debug, Clone)]
pub struct XmlMapSource {
    maps_dir: PathBuf,
}

impl XmlMapSource {
    pub fn new(maps_dir: impl Into<PathBuf>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
        }
    }

    pub fn map_path(&self, name: &str) -> PathBuf {
        self.maps_dir.join(format!("{name}.xml"))
    }
}

impl MapSource for XmlMapSource {
    fn load_map(&self, data: &MapData) -> Result<Map, MapLoadError> {
        let path = self.map_path(&data.name);
        match XmlTreeStore.load_tree(&path)? {
            Some(node) => map_from_node(data, &node, &path),
            None => {
                warn!(map = %data.name, path = %path.display(), "map_file_missing_using_empty_map");
                Ok(Map::empty(data))
            }
        }
    }
}

/// Builds a map from a parsed `<map>` tree. Position and size always come
/// from `data`.
pub fn map_from_node(data: &MapData, node: &TreeNode, path: &Path) -> Result<Map, MapLoadError> {
    let mut map = Map::empty(data);

    if let Some(tiles) = node.find_child("tiles") {
        let rows = parse_tile_rows(&data.name, &tiles.text)?;
        map.fill_tiles(&rows);
    }

    if let Some(triggers) = node.find_child("triggers") {
        for trigger in triggers.children_by_tag("trigger") {
            let Some(name) = trigger.get_attribute("name") else {
                continue;
            };
            map.add_trigger(Trigger {
                name: name.to_string(),
                rect: rect_attributes(trigger),
                active: trigger.get_attribute("active") != Some("0"),
            });
        }
    }

    if let Some(entities) = node.find_child("entities") {
        for entity in entities.children_by_tag("entity") {
            let Some(name) = entity.get_attribute("name") else {
                continue;
            };
            let genus = Genus::parse(entity.get_attribute("genus").unwrap_or(""));
            map.add_entity(MapEntity::new(name, genus, rect_attributes(entity)));
        }
    }

    if let Some(params) = node.find_child("params") {
        for param in params.children_by_tag("param") {
            if let Some(name) = param.get_attribute("name") {
                map.set_param(name, param.get_attribute("value").unwrap_or(""));
            }
        }
    }

    if let Some(scripts) = node.find_child("scripts") {
        for script in scripts.children_by_tag("script") {
            if let Some(name) = script.get_attribute("name") {
                map.add_script(name, script.text.clone());
            }
        }
    }

    debug!(
        map = %data.name,
        path = %path.display(),
        triggers = map.triggers().len(),
        entities = map.entities().len(),
        "map_file_loaded"
    );
    Ok(map)
}

fn parse_tile_rows(map: &str, text: &str) -> Result<Vec<Vec<u16>>, MapLoadError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(row, line)| {
            line.split(',')
                .enumerate()
                .map(|(column, cell)| {
                    let cell = cell.trim();
                    cell.parse::<u16>().map_err(|_| MapLoadError::BadTile {
                        map: map.to_string(),
                        row,
                        column,
                        value: cell.to_string(),
                    })
                })
                .collect()
        })
        .collect()
}

fn rect_attributes(node: &TreeNode) -> Rect {
    let int = |key: &str| {
        node.get_attribute(key)
            .and_then(|value| value.trim().parse::<i32>().ok())
            .unwrap_or(0)
    };
    Rect::new(int("x"), int("y"), int("width"), int("height"))
}
