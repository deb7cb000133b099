use std::collections::BTreeMap;

use tracing::debug;

use crate::config::UniverseConfig;
use crate::geometry::Rect;
use crate::map_data::MapData;
use crate::tree::TreeNode;

/// Tile values that block movement and spawning.
pub const SOLID_TILES: [u16; 3] = [2, 3, 6];

/// Map `type` params whose state is never remembered between visits.
const MEMORYLESS_MAP_TYPES: [&str; 2] = ["challenge", "puzzle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genus {
    Player,
    Enemy,
    Npc,
    Gold,
    Other,
}

impl Genus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "player" => Genus::Player,
            "enemy" => Genus::Enemy,
            "npc" => Genus::Npc,
            "gold" => Genus::Gold,
            _ => Genus::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Genus::Player => "player",
            Genus::Enemy => "enemy",
            Genus::Npc => "npc",
            Genus::Gold => "gold",
            Genus::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntityStatus {
    #[default]
    Active,
    Inactive,
    Dying,
}

impl EntityStatus {
    /// Network and memory code: active 1, inactive 2, dying 3.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EntityStatus::Active),
            2 => Some(EntityStatus::Inactive),
            3 => Some(EntityStatus::Dying),
            _ => None,
        }
    }

    pub fn as_code(self) -> i32 {
        match self {
            EntityStatus::Active => 1,
            EntityStatus::Inactive => 2,
            EntityStatus::Dying => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    Up,
    #[default]
    Right,
    Down,
    Left,
}

impl Direction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Direction::Up),
            2 => Some(Direction::Right),
            3 => Some(Direction::Down),
            4 => Some(Direction::Left),
            _ => None,
        }
    }

    pub fn as_code(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Right => 2,
            Direction::Down => 3,
            Direction::Left => 4,
        }
    }
}

/// An entity's pixel rect is relative to its map's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntity {
    pub name: String,
    pub genus: Genus,
    pub rect: Rect,
    pub status: EntityStatus,
    pub direction: Direction,
    pub last_lateral_move: Option<Direction>,
    pub last_vertical_move: Option<Direction>,
    pub last_attempted_lateral_move: Option<Direction>,
    pub last_attempted_vertical_move: Option<Direction>,
    pub pending_death: Option<String>,
}

impl MapEntity {
    pub fn new(name: impl Into<String>, genus: Genus, rect: Rect) -> Self {
        Self {
            name: name.into(),
            genus,
            rect,
            status: EntityStatus::Active,
            direction: Direction::default(),
            last_lateral_move: None,
            last_vertical_move: None,
            last_attempted_lateral_move: None,
            last_attempted_vertical_move: None,
            pending_death: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    /// Copies facing and movement memory from `other`.
    pub fn inherit_motion_from(&mut self, other: &MapEntity) {
        self.direction = other.direction;
        self.last_lateral_move = other.last_lateral_move;
        self.last_vertical_move = other.last_vertical_move;
        self.last_attempted_lateral_move = other.last_attempted_lateral_move;
        self.last_attempted_vertical_move = other.last_attempted_vertical_move;
    }
}

/// Named waypoint rect in map-relative pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub rect: Rect,
    pub active: bool,
}

/// Column range (in tiles, relative to the map) below the bottom edge with
/// no map underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallRegion {
    pub start: i32,
    pub width: i32,
}

impl FallRegion {
    /// One tile row directly beneath the map, in map-relative pixels.
    pub fn relative_rect(&self, map_height: i32, config: &UniverseConfig) -> Rect {
        Rect::new(
            self.start * config.tile_width,
            map_height * config.tile_height,
            self.width * config.tile_width,
            config.tile_height,
        )
    }
}

/// Collision grid of a map widened by `boundary` tiles on every side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundsPlane {
    width: i32,
    height: i32,
    boundary: i32,
    cells: Vec<u16>,
}

impl BoundsPlane {
    pub fn new(map_width: i32, map_height: i32, boundary: i32) -> Self {
        let width = map_width.max(0) + 2 * boundary;
        let height = map_height.max(0) + 2 * boundary;
        Self {
            width,
            height,
            boundary,
            cells: vec![0; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn boundary(&self) -> i32 {
        self.boundary
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let (px, py) = (x + self.boundary, y + self.boundary);
        if px < 0 || py < 0 || px >= self.width || py >= self.height {
            return None;
        }
        Some((py * self.width + px) as usize)
    }

    /// Tile at map-relative `(x, y)`; the border starts at `-boundary`.
    pub fn get(&self, x: i32, y: i32) -> u16 {
        self.index(x, y).map(|i| self.cells[i]).unwrap_or(0)
    }

    pub fn set(&mut self, x: i32, y: i32, value: u16) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = value;
        }
    }

    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        SOLID_TILES.contains(&self.get(x, y))
    }
}

/// A loaded, simulating map.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub name: String,
    pub x: i32,
    pub y: i32,
    width: i32,
    height: i32,
    tiles: Vec<u16>,
    triggers: Vec<Trigger>,
    entities: Vec<MapEntity>,
    params: BTreeMap<String, String>,
    scripts: BTreeMap<String, String>,
    fall_regions: Vec<FallRegion>,
    bounds_plane: Option<BoundsPlane>,
    completion_ticks: u64,
    busy: bool,
}

impl Map {
    /// Empty map occupying `data`'s position and size.
    pub fn empty(data: &MapData) -> Self {
        let width = data.width.max(0);
        let height = data.height.max(0);
        Self {
            name: data.name.clone(),
            x: data.x,
            y: data.y,
            width,
            height,
            tiles: vec![0; (width * height) as usize],
            triggers: Vec::new(),
            entities: Vec::new(),
            params: BTreeMap::new(),
            scripts: BTreeMap::new(),
            fall_regions: Vec::new(),
            bounds_plane: None,
            completion_ticks: 0,
            busy: false,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tile(&self, x: i32, y: i32) -> u16 {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return 0;
        }
        self.tiles[(y * self.width + x) as usize]
    }

    pub fn set_tile(&mut self, x: i32, y: i32, value: u16) {
        if x >= 0 && y >= 0 && x < self.width && y < self.height {
            self.tiles[(y * self.width + x) as usize] = value;
        }
    }

    /// `rows[y][x]`; short rows are padded with open tiles, extra columns
    /// and rows are dropped.
    pub fn fill_tiles(&mut self, rows: &[Vec<u16>]) {
        for (y, row) in rows.iter().enumerate().take(self.height as usize) {
            for (x, value) in row.iter().enumerate().take(self.width as usize) {
                self.set_tile(x as i32, y as i32, *value);
            }
        }
    }

    pub fn relative_rect(&self, config: &UniverseConfig) -> Rect {
        Rect::new(
            0,
            0,
            self.width * config.tile_width,
            self.height * config.tile_height,
        )
    }

    /// This map's pixel rect in the coordinate space of a map whose tile
    /// origin is `origin`.
    pub fn relative_rect_from(&self, origin: (i32, i32), config: &UniverseConfig) -> Rect {
        Rect::new(
            (self.x - origin.0) * config.tile_width,
            (self.y - origin.1) * config.tile_height,
            self.width * config.tile_width,
            self.height * config.tile_height,
        )
    }

    /// True when `rect` (map-relative pixels) covers any solid tile. Cells
    /// past the edge read from the bounds plane when one is built, so the
    /// facing edge of a flush neighbor blocks like this map's own tiles.
    pub fn rect_collides(&self, rect: Rect, config: &UniverseConfig) -> bool {
        if rect.w <= 0 || rect.h <= 0 {
            return false;
        }
        let first_x = rect.x.div_euclid(config.tile_width);
        let first_y = rect.y.div_euclid(config.tile_height);
        let last_x = (rect.right() - 1).div_euclid(config.tile_width);
        let last_y = (rect.bottom() - 1).div_euclid(config.tile_height);
        (first_y..=last_y).any(|ty| (first_x..=last_x).any(|tx| self.is_solid_at(tx, ty)))
    }

    fn is_solid_at(&self, x: i32, y: i32) -> bool {
        let inside = x >= 0 && y >= 0 && x < self.width && y < self.height;
        match &self.bounds_plane {
            Some(plane) if !inside => plane.is_solid(x, y),
            _ => SOLID_TILES.contains(&self.tile(x, y)),
        }
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn add_trigger(&mut self, trigger: Trigger) {
        self.triggers.retain(|existing| existing.name != trigger.name);
        self.triggers.push(trigger);
    }

    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|trigger| trigger.name == name)
    }

    pub fn entities(&self) -> &[MapEntity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut MapEntity> {
        self.entities.iter_mut()
    }

    pub fn add_entity(&mut self, entity: MapEntity) {
        self.entities.push(entity);
    }

    pub fn entity(&self, name: &str) -> Option<&MapEntity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut MapEntity> {
        self.entities.iter_mut().find(|entity| entity.name == name)
    }

    /// Removes and returns every entity of `genus`.
    pub fn remove_entities_by_genus(&mut self, genus: Genus) -> Vec<MapEntity> {
        let (removed, kept) = std::mem::take(&mut self.entities)
            .into_iter()
            .partition(|entity| entity.genus == genus);
        self.entities = kept;
        removed
    }

    pub fn remaining_gold_count(&self) -> u32 {
        self.entities
            .iter()
            .filter(|entity| entity.genus == Genus::Gold && entity.is_active())
            .count() as u32
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    pub fn add_script(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.scripts.insert(name.into(), body.into());
    }

    pub fn fall_regions(&self) -> &[FallRegion] {
        &self.fall_regions
    }

    pub fn set_fall_regions(&mut self, regions: Vec<FallRegion>) {
        self.fall_regions = regions;
    }

    pub fn set_bounds_plane(&mut self, plane: BoundsPlane) {
        self.bounds_plane = Some(plane);
    }

    pub fn completion_ticks(&self) -> u64 {
        self.completion_ticks
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// One simulation step: advance the completion clock and retire dying
    /// non-player entities.
    pub fn process(&mut self) {
        self.completion_ticks += 1;
        for entity in &mut self.entities {
            if entity.status == EntityStatus::Dying && entity.genus != Genus::Player {
                entity.status = EntityStatus::Inactive;
            }
        }
    }

    pub fn keeps_memory(&self) -> bool {
        !self
            .param("type")
            .is_some_and(|kind| MEMORYLESS_MAP_TYPES.contains(&kind))
    }

    /// Snapshot of params, trigger flags and non-player entities, or `None`
    /// for maps that never remember state.
    pub fn save_memory(&self) -> Option<TreeNode> {
        if !self.keeps_memory() {
            debug!(map = %self.name, "map_memory_skipped");
            return None;
        }

        let mut params = TreeNode::new("params");
        for (name, value) in &self.params {
            params.add_child(
                TreeNode::new("param")
                    .with_attribute("name", name)
                    .with_attribute("value", value),
            );
        }

        let mut triggers = TreeNode::new("triggers");
        for trigger in &self.triggers {
            triggers.add_child(
                TreeNode::new("trigger")
                    .with_attribute("name", &trigger.name)
                    .with_attribute("active", u8::from(trigger.active)),
            );
        }

        let mut entities = TreeNode::new("entities");
        for entity in self.entities.iter().filter(|e| e.genus != Genus::Player) {
            entities.add_child(
                TreeNode::new("entity")
                    .with_attribute("name", &entity.name)
                    .with_attribute("status", entity.status.as_code())
                    .with_attribute("x", entity.rect.x)
                    .with_attribute("y", entity.rect.y)
                    .with_attribute("direction", entity.direction.as_code()),
            );
        }

        Some(
            TreeNode::new("memory")
                .with_attribute("map", &self.name)
                .with_child(params)
                .with_child(triggers)
                .with_child(entities),
        )
    }

    /// Restores a memory snapshot. Entities and triggers not present on
    /// this map are ignored.
    pub fn load_memory(&mut self, node: &TreeNode) {
        if let Some(params) = node.find_child("params") {
            for param in params.children_by_tag("param") {
                if let Some(name) = param.get_attribute("name") {
                    let value = param.get_attribute("value").unwrap_or("");
                    self.params.insert(name.to_string(), value.to_string());
                }
            }
        }

        if let Some(triggers) = node.find_child("triggers") {
            for saved in triggers.children_by_tag("trigger") {
                let Some(name) = saved.get_attribute("name") else {
                    continue;
                };
                if let Some(trigger) = self.triggers.iter_mut().find(|t| t.name == name) {
                    trigger.active = saved.get_attribute("active") != Some("0");
                }
            }
        }

        if let Some(entities) = node.find_child("entities") {
            for saved in entities.children_by_tag("entity") {
                let Some(name) = saved.get_attribute("name") else {
                    continue;
                };
                let Some(entity) = self.entity_mut(name) else {
                    debug!(entity = name, "map_memory_entity_missing");
                    continue;
                };
                let int = |key: &str| saved.get_attribute(key).and_then(|v| v.parse::<i32>().ok());
                if let Some(status) = int("status").and_then(EntityStatus::from_code) {
                    entity.status = status;
                }
                if let Some(x) = int("x") {
                    entity.rect.x = x;
                }
                if let Some(y) = int("y") {
                    entity.rect.y = y;
                }
                if let Some(direction) = int("direction").and_then(Direction::from_code) {
                    entity.direction = direction;
                }
            }
        }
    }
}
