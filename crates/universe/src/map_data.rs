use tracing::debug;

use crate::config::UniverseConfig;
use crate::geometry::Rect;
use crate::tree::TreeNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Background,
    #[default]
    Foreground,
}

impl Layer {
    pub fn as_code(self) -> i32 {
        match self {
            Layer::Foreground => 1,
            Layer::Background => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Layer::Foreground),
            2 => Some(Layer::Background),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Layer::Foreground => "foreground",
            Layer::Background => "background",
        }
    }
}

/// Keys understood by [`MapData::configure`]; anything else is ignored.
pub const MAP_DATA_KEYS: [&str; 12] = [
    "name",
    "class",
    "rel",
    "title",
    "difficulty",
    "x",
    "y",
    "width",
    "height",
    "gold-count",
    "layer",
    "completion-time",
];

/// Static per-map metadata plus the handful of flags mutated during play.
/// Position and size are in tiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    pub name: String,
    pub title: String,
    pub class_name: String,
    pub rel: String,
    pub difficulty: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    gold_count: u32,
    gold_remaining: u32,
    pub layer: Layer,
    pub visited: bool,
    pub visible: bool,
    pub completed: bool,
    pub completion_time: u64,
    adjacent_maps: Vec<String>,
    parallax_maps: Vec<String>,
}

impl MapData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Partial update from string options. Numeric fields that fail to parse
    /// keep their previous value.
    pub fn configure<'a, I>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in options {
            match key {
                "name" => self.name = value.to_string(),
                "class" => self.class_name = value.to_string(),
                "rel" => self.rel = value.to_string(),
                "title" => self.title = value.to_string(),
                "difficulty" => self.difficulty = value.to_string(),
                "x" => parse_into(value, &mut self.x),
                "y" => parse_into(value, &mut self.y),
                "width" => parse_into(value, &mut self.width),
                "height" => parse_into(value, &mut self.height),
                "gold-count" => {
                    let mut count = self.gold_count;
                    parse_into(value, &mut count);
                    self.set_gold_count(count);
                }
                "layer" => {
                    let mut code = self.layer.as_code();
                    parse_into(value, &mut code);
                    if let Some(layer) = Layer::from_code(code) {
                        self.layer = layer;
                    }
                }
                "completion-time" => parse_into(value, &mut self.completion_time),
                other => debug!(key = other, map = %self.name, "map_data_option_ignored"),
            }
        }
        self
    }

    pub fn from_node(node: &TreeNode) -> Self {
        let mut data = MapData::default();
        data.load_state(node);
        data
    }

    pub fn load_state(&mut self, node: &TreeNode) {
        let options = MAP_DATA_KEYS
            .iter()
            .filter_map(|key| node.get_attribute(key).map(|value| (*key, value)))
            .collect::<Vec<_>>();
        self.configure(options);
    }

    pub fn save_state(&self) -> TreeNode {
        TreeNode::new("map")
            .with_attribute("name", &self.name)
            .with_attribute("title", &self.title)
            .with_attribute("class", &self.class_name)
            .with_attribute("rel", &self.rel)
            .with_attribute("difficulty", &self.difficulty)
            .with_attribute("x", self.x)
            .with_attribute("y", self.y)
            .with_attribute("width", self.width)
            .with_attribute("height", self.height)
            .with_attribute("gold-count", self.gold_count)
            .with_attribute("layer", self.layer.as_code())
            .with_attribute("completion-time", self.completion_time)
    }

    /// `"*"` matches every map; otherwise any space-separated class token.
    pub fn has_class(&self, name: &str) -> bool {
        name == "*"
            || self
                .class_name
                .split(' ')
                .any(|token| !token.is_empty() && token == name)
    }

    pub fn gold_count(&self) -> u32 {
        self.gold_count
    }

    pub fn gold_remaining(&self) -> u32 {
        self.gold_remaining
    }

    pub fn has_gold_remaining(&self) -> bool {
        self.gold_remaining > 0
    }

    pub fn set_gold_count(&mut self, count: u32) {
        self.gold_count = count;
        self.gold_remaining = count;
    }

    pub fn set_gold_remaining(&mut self, remaining: u32) {
        self.gold_remaining = remaining.min(self.gold_count);
    }

    pub fn adjacent_maps(&self) -> &[String] {
        &self.adjacent_maps
    }

    pub fn parallax_maps(&self) -> &[String] {
        &self.parallax_maps
    }

    pub fn add_adjacent_map(&mut self, name: &str) {
        if !self.adjacent_maps.iter().any(|existing| existing == name) {
            self.adjacent_maps.push(name.to_string());
        }
    }

    pub fn add_parallax_map(&mut self, name: &str) {
        if !self.parallax_maps.iter().any(|existing| existing == name) {
            self.parallax_maps.push(name.to_string());
        }
    }

    pub fn clear_adjacency(&mut self) {
        self.adjacent_maps.clear();
    }

    pub fn clear_parallax(&mut self) {
        self.parallax_maps.clear();
    }

    pub fn reset_world_map_data(&mut self) {
        self.visited = false;
        self.visible = false;
        self.gold_remaining = self.gold_count;
        self.completed = false;
    }

    pub fn mark_as_visible(&mut self) {
        self.visible = true;
    }

    pub fn mark_as_visited(&mut self) {
        self.visited = true;
        self.visible = true;
    }

    pub fn mark_as_completed(&mut self) {
        self.completed = true;
    }

    pub fn tile_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn pixel_rect(&self, config: &UniverseConfig) -> Rect {
        Rect::new(
            self.x * config.tile_width,
            self.y * config.tile_height,
            self.width * config.tile_width,
            self.height * config.tile_height,
        )
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, slot: &mut T) {
    if let Ok(parsed) = raw.trim().parse::<T>() {
        *slot = parsed;
    }
}
