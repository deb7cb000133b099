use crate::config::UniverseConfig;
use crate::geometry::{Rect, Vec2};
use crate::map_data::MapData;

/// Progress of the cached background composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrerenderStatus {
    /// Waiting for the camera to settle on a freshly activated map.
    #[default]
    Pending,
    /// The renderer should rebuild the composite this frame.
    Ready,
    /// A composite exists and covers the camera.
    Done,
}

/// Viewport with a current position that eases toward a target.
///
/// While `lock_count > 0` the position and target cannot be changed through
/// `position`, `focus`, `center_on_entity_within_map` or `zap`. `pan` still
/// runs so a locked camera finishes an in-flight move.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
    pub target_x: i32,
    pub target_y: i32,
    lock_count: u32,
    width: i32,
    height: i32,
    prerender_bounds: Rect,
    prerender_location: (i32, i32),
    dirty: bool,
}

impl Camera {
    pub fn new(config: &UniverseConfig) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            target_x: 0,
            target_y: 0,
            lock_count: 0,
            width: config.screen_width,
            height: config.screen_height,
            prerender_bounds: Rect::EMPTY,
            prerender_location: (0, 0),
            dirty: false,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    pub fn lock(&mut self) {
        self.lock_count = self.lock_count.saturating_add(1);
    }

    pub fn unlock(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn position(&mut self, x: f32, y: f32) {
        if !self.is_locked() {
            self.x = x;
            self.y = y;
        }
    }

    pub fn location(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn viewport(&self) -> Rect {
        Rect::new(self.x as i32, self.y as i32, self.width, self.height)
    }

    pub fn is_settled(&self) -> bool {
        self.x as i32 == self.target_x && self.y as i32 == self.target_y
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn prerender_bounds(&self) -> Rect {
        self.prerender_bounds
    }

    pub fn prerender_location(&self) -> (i32, i32) {
        self.prerender_location
    }

    /// Installs a new prerender validity region. This is the only way to
    /// clear the dirty flag.
    pub fn configure_prerender(&mut self, bounds: Rect, location: (i32, i32)) {
        self.prerender_bounds = bounds;
        self.prerender_location = location;
        self.dirty = false;
    }

    /// Screen offset that makes a layer drawn with `parallax` lag behind the
    /// camera. The sign follows the sign of each coordinate.
    pub fn parallax_offsets_at_location(x: i32, y: i32, parallax: f32) -> (i32, i32) {
        (parallax_axis(x, parallax), parallax_axis(y, parallax))
    }

    /// Retargets so `entity` (map-relative pixels) stays in view.
    ///
    /// Per axis: a map that fits inside the viewport minus both perimeter
    /// margins is centered and the entity ignored. Otherwise the camera
    /// only scrolls once the entity is closer than the minimum scroll
    /// distance to an edge, and the target never leaves the map by more
    /// than the perimeter scroll.
    pub fn focus(&mut self, entity: Rect, map: &MapData, config: &UniverseConfig) {
        if self.is_locked() {
            return;
        }

        let map_rect = map.pixel_rect(config);

        let (target_x, snapped_x) = focus_axis(AxisFocus {
            map_origin: map_rect.x,
            map_extent: map_rect.w,
            viewport: self.width,
            current: self.x as i32,
            entity_origin: map_rect.x + entity.x,
            entity_extent: entity.w,
            min_scroll: config.min_map_scroll_x,
            max_perimeter: config.max_perimeter_scroll_x,
        });
        self.target_x = target_x;
        if snapped_x {
            self.x = self.x.trunc();
        }

        let (target_y, snapped_y) = focus_axis(AxisFocus {
            map_origin: map_rect.y,
            map_extent: map_rect.h,
            viewport: self.height,
            current: self.y as i32,
            entity_origin: map_rect.y + entity.y,
            entity_extent: entity.h,
            min_scroll: config.min_map_scroll_y,
            max_perimeter: config.max_perimeter_scroll_y,
        });
        self.target_y = target_y;
        if snapped_y {
            self.y = self.y.trunc();
        }
    }

    /// Immediate cut target: entity center at viewport center, no easing.
    pub fn center_on_entity_within_map(
        &mut self,
        entity: Rect,
        map: &MapData,
        config: &UniverseConfig,
    ) {
        if self.is_locked() {
            return;
        }
        let map_rect = map.pixel_rect(config);
        self.target_x = entity.x + entity.w / 2 - self.width / 2 + map_rect.x;
        self.target_y = entity.y + entity.h / 2 - self.height / 2 + map_rect.y;
    }

    /// Moves toward the target by at most `speed_x`/`speed_y`, never past it.
    pub fn pan(&mut self, speed_x: f32, speed_y: f32) {
        self.x = approach(self.x, self.target_x as f32, speed_x);
        self.y = approach(self.y, self.target_y as f32, speed_y);
    }

    /// Pans at `speed` along x and derives the y speed from the slope to the
    /// target when both axes are moving, so the path is a straight line.
    pub fn pan_diagonal(&mut self, speed: f32) {
        let dx = self.target_x as f32 - self.x;
        let dy = self.target_y as f32 - self.y;
        let speed_y = if dx != 0.0 && dy != 0.0 {
            (dy / dx * speed).abs()
        } else {
            speed
        };
        self.pan(speed, speed_y);
    }

    pub fn zap(&mut self) {
        if !self.is_locked() {
            self.x = self.target_x as f32;
            self.y = self.target_y as f32;
        }
    }

    /// Flags the camera dirty once the viewport leaves the prerender bounds.
    pub fn process(&mut self) {
        if !self.dirty && !self.viewport().within(&self.prerender_bounds) {
            self.dirty = true;
        }
    }
}

fn parallax_axis(value: i32, parallax: f32) -> i32 {
    let magnitude = value.abs();
    let offset = (magnitude as f32 / parallax) as i32 - magnitude;
    if value < 0 {
        -offset
    } else {
        offset
    }
}

fn approach(current: f32, target: f32, speed: f32) -> f32 {
    if current < target {
        (current + speed).min(target)
    } else if current > target {
        (current - speed).max(target)
    } else {
        current
    }
}

struct AxisFocus {
    map_origin: i32,
    map_extent: i32,
    viewport: i32,
    current: i32,
    entity_origin: i32,
    entity_extent: i32,
    min_scroll: i32,
    max_perimeter: i32,
}

/// Returns the new target and whether the current position should be
/// truncated to a whole pixel (the "no scroll needed" case).
fn focus_axis(axis: AxisFocus) -> (i32, bool) {
    if axis.map_extent <= axis.viewport - 2 * axis.max_perimeter {
        let center = axis.map_origin + axis.map_extent / 2;
        return (center - axis.viewport / 2, false);
    }

    let low_limit = axis.map_origin - axis.max_perimeter;
    let high_limit = axis.map_origin + axis.map_extent + axis.max_perimeter - axis.viewport;

    let entity_end = axis.entity_origin + axis.entity_extent;
    let (target, snapped) = if axis.entity_origin - axis.current < axis.min_scroll {
        (axis.entity_origin - axis.min_scroll, false)
    } else if axis.current + axis.viewport - entity_end < axis.min_scroll {
        (axis.min_scroll + entity_end - axis.viewport, false)
    } else {
        (axis.current, true)
    };

    let clamped = if target < low_limit {
        low_limit
    } else if target > high_limit {
        high_limit
    } else {
        target
    };
    (clamped, snapped)
}
