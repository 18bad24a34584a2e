use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use serde::{Deserialize, Serialize};

/// Identifies a sprite. Only the lower 16 bits are ever meaningful.
pub type SpriteId = u16;

/// Identifies a light. Handed out by a monotonically increasing counter, never reused.
pub type LightId = u64;

/// Identifies a chunk by its position in the chunk grid.
///
/// The column lives in the upper 32 bits and the row in the lower 32 bits, so ids
/// order row-major within a column and are cheap to hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl ChunkId {
    pub fn new(x: u32, y: u32) -> Self {
        Self(((x as u64) << 32) | y as u64)
    }

    /// Column of the chunk in the chunk grid.
    pub fn x(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Row of the chunk in the chunk grid.
    pub fn y(self) -> u32 {
        self.0 as u32
    }

    pub fn coords(self) -> UVec2 {
        UVec2::new(self.x(), self.y())
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk({}, {})", self.x(), self.y())
    }
}

/// 8-bit RGBA color. Laid out as four bytes so pixel buffers can be cast to bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Per-channel saturating sum; used for additive light blending.
    pub fn saturating_add(self, other: Color) -> Self {
        Self {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
            a: self.a.saturating_add(other.a),
        }
    }

    /// Per-channel product normalized to 0..=255 (multiplicative blending).
    pub fn modulate(self, other: Color) -> Self {
        let mul = |x: u8, y: u8| ((x as u16 * y as u16 + 127) / 255) as u8;
        Self {
            r: mul(self.r, other.r),
            g: mul(self.g, other.g),
            b: mul(self.b, other.b),
            a: mul(self.a, other.a),
        }
    }

    /// Scales RGB by `factor` (clamped to 0..=1), leaving alpha untouched.
    pub fn scaled(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        let s = |x: u8| (x as f32 * f).round() as u8;
        Self {
            r: s(self.r),
            g: s(self.g),
            b: s(self.b),
            a: self.a,
        }
    }
}

/// Axis-aligned rectangle in cell coordinates. `x + width` and `y + height` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CellRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing both corners (inclusive).
    pub fn from_corners(a: UVec2, b: UVec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::new(min.x, min.y, max.x - min.x + 1, max.y - min.y + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn end_x(&self) -> u32 {
        self.x + self.width
    }

    pub fn end_y(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, cell: UVec2) -> bool {
        cell.x >= self.x && cell.x < self.end_x() && cell.y >= self.y && cell.y < self.end_y()
    }

    pub fn intersects(&self, other: &CellRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.end_x()
            && other.x < self.end_x()
            && self.y < other.end_y()
            && other.y < self.end_y()
    }

    /// Grow to include `cell`. An empty rectangle becomes the single cell.
    pub fn include(&mut self, cell: UVec2) {
        if self.is_empty() {
            *self = Self::new(cell.x, cell.y, 1, 1);
            return;
        }
        let min_x = self.x.min(cell.x);
        let min_y = self.y.min(cell.y);
        let end_x = self.end_x().max(cell.x + 1);
        let end_y = self.end_y().max(cell.y + 1);
        *self = Self::new(min_x, min_y, end_x - min_x, end_y - min_y);
    }

    /// Expand by `margin` cells on every side, clamped to `[0, limit)`.
    pub fn expanded(&self, margin: u32, limit: UVec2) -> Self {
        let min_x = self.x.saturating_sub(margin);
        let min_y = self.y.saturating_sub(margin);
        let end_x = self.end_x().saturating_add(margin).min(limit.x);
        let end_y = self.end_y().saturating_add(margin).min(limit.y);
        Self::new(
            min_x,
            min_y,
            end_x.saturating_sub(min_x),
            end_y.saturating_sub(min_y),
        )
    }

    /// Iterate every cell in the rectangle, row by row.
    pub fn cells(&self) -> impl Iterator<Item = UVec2> + use<> {
        let (x0, x1, y0, y1) = (self.x, self.end_x(), self.y, self.end_y());
        (y0..y1).flat_map(move |y| (x0..x1).map(move |x| UVec2::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_packs_coordinates() {
        let id = ChunkId::new(7, 123_456);
        assert_eq!(id.x(), 7);
        assert_eq!(id.y(), 123_456);
        assert_eq!(id.coords(), UVec2::new(7, 123_456));
        assert_ne!(ChunkId::new(1, 0), ChunkId::new(0, 1));
    }

    #[test]
    fn color_is_four_bytes() {
        let pixels = [Color::rgba(1, 2, 3, 4), Color::WHITE];
        let bytes: &[u8] = bytemuck::cast_slice(&pixels);
        assert_eq!(bytes, &[1, 2, 3, 4, 255, 255, 255, 255]);
    }

    #[test]
    fn color_blending() {
        let c = Color::rgb(200, 100, 0).saturating_add(Color::rgb(100, 100, 10));
        assert_eq!(c, Color::rgba(255, 200, 10, 255));
        assert_eq!(Color::WHITE.modulate(Color::rgb(10, 20, 30)), Color::rgb(10, 20, 30));
        assert_eq!(Color::rgb(200, 100, 50).scaled(0.5), Color::rgb(100, 50, 25));
    }

    #[test]
    fn rect_include_and_intersect() {
        let mut r = CellRect::default();
        assert!(r.is_empty());
        r.include(UVec2::new(3, 3));
        r.include(UVec2::new(1, 5));
        assert_eq!(r, CellRect::new(1, 3, 3, 3));
        assert!(r.contains(UVec2::new(2, 4)));
        assert!(!r.contains(UVec2::new(4, 4)));
        assert!(r.intersects(&CellRect::new(3, 5, 2, 2)));
        assert!(!r.intersects(&CellRect::new(4, 3, 2, 2)));
    }

    #[test]
    fn rect_expand_clamps_to_limit() {
        let r = CellRect::new(0, 2, 2, 2).expanded(1, UVec2::new(3, 10));
        assert_eq!(r, CellRect::new(0, 1, 3, 4));
        assert_eq!(r.cells().count(), 12);
    }
}
