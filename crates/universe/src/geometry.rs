#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned pixel or tile rectangle. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        x: 0,
        y: 0,
        w: 0,
        h: 0,
    };

    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Strict overlap test. Rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(other.x >= self.right()
            || other.right() <= self.x
            || other.y >= self.bottom()
            || other.bottom() <= self.y)
    }

    /// True when `self` lies entirely inside `outer` (edges may touch).
    pub fn within(&self, outer: &Rect) -> bool {
        self.x >= outer.x
            && self.right() <= outer.right()
            && self.y >= outer.y
            && self.bottom() <= outer.bottom()
    }

    /// Shifts the origin by `(dx, dy)` and grows the size by `(dw, dh)`.
    pub fn offset(&self, dx: i32, dy: i32, dw: i32, dh: i32) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            w: self.w + dw,
            h: self.h + dh,
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        self.offset(dx, dy, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_contact_is_not_intersection() {
        let a = Rect::new(0, 0, 240, 240);
        let b = Rect::new(240, 0, 240, 240);
        assert!(!a.intersects(&b));
        assert!(a.offset(-1, 0, 2, 0).intersects(&b));
    }

    #[test]
    fn within_allows_touching_edges() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(Rect::new(0, 0, 100, 100).within(&outer));
        assert!(Rect::new(10, 10, 20, 20).within(&outer));
        assert!(!Rect::new(90, 10, 20, 20).within(&outer));
    }

    #[test]
    fn offset_grows_from_origin() {
        let rect = Rect::new(10, 20, 30, 40).offset(-5, -5, 10, 10);
        assert_eq!(rect, Rect::new(5, 15, 40, 50));
        assert_eq!(rect.right(), 45);
        assert_eq!(rect.bottom(), 65);
    }
}
