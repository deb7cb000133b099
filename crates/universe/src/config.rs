pub const TILE_WIDTH: i32 = 24;
pub const TILE_HEIGHT: i32 = 24;
pub const SCREEN_WIDTH: i32 = 640;
pub const SCREEN_HEIGHT: i32 = 480;

pub const MAX_PERIMETER_SCROLL_X: i32 = 48;
pub const MAX_PERIMETER_SCROLL_Y: i32 = 96;
pub const MIN_MAP_SCROLL_X: i32 = 200;
pub const MIN_MAP_SCROLL_Y: i32 = 150;

pub const CAMERA_SPEED: f32 = 22.5;

pub const BACKGROUND_MAP_SCALE: f32 = 0.75;
pub const BACKGROUND_MAP_PARALLAX_SCALE: f32 = 0.85;

pub const COLLISION_BOUNDARY_SIZE: i32 = 2;

pub const MAX_SKILL_SLOTS: u32 = 2;

/// Tunables shared by the camera, the adjacency engine and the map builder.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseConfig {
    pub tile_width: i32,
    pub tile_height: i32,
    pub screen_width: i32,
    pub screen_height: i32,
    pub max_perimeter_scroll_x: i32,
    pub max_perimeter_scroll_y: i32,
    pub min_map_scroll_x: i32,
    pub min_map_scroll_y: i32,
    pub camera_speed: f32,
    pub background_map_scale: f32,
    pub background_map_parallax_scale: f32,
    pub collision_boundary_size: i32,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            tile_width: TILE_WIDTH,
            tile_height: TILE_HEIGHT,
            screen_width: SCREEN_WIDTH,
            screen_height: SCREEN_HEIGHT,
            max_perimeter_scroll_x: MAX_PERIMETER_SCROLL_X,
            max_perimeter_scroll_y: MAX_PERIMETER_SCROLL_Y,
            min_map_scroll_x: MIN_MAP_SCROLL_X,
            min_map_scroll_y: MIN_MAP_SCROLL_Y,
            camera_speed: CAMERA_SPEED,
            background_map_scale: BACKGROUND_MAP_SCALE,
            background_map_parallax_scale: BACKGROUND_MAP_PARALLAX_SCALE,
            collision_boundary_size: COLLISION_BOUNDARY_SIZE,
        }
    }
}

impl UniverseConfig {
    pub fn scale_for_layer(&self, layer: crate::Layer) -> f32 {
        match layer {
            crate::Layer::Foreground => 1.0,
            crate::Layer::Background => self.background_map_scale,
        }
    }

    pub fn parallax_for_layer(&self, layer: crate::Layer) -> f32 {
        match layer {
            crate::Layer::Foreground => 1.0,
            crate::Layer::Background => self.background_map_parallax_scale,
        }
    }
}
