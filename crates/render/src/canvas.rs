use std::collections::HashMap;

use glam::{UVec2, Vec2};
use gridspace_common::{Color, SpriteId};

/// How drawn pixels combine with what is already on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Alpha,
    Add,
    Multiply,
}

impl BlendMode {
    pub fn apply(self, dst: Color, src: Color) -> Color {
        match self {
            BlendMode::Alpha => {
                let a = src.a as f32 / 255.0;
                let mix = |d: u8, s: u8| (d as f32 + (s as f32 - d as f32) * a).round() as u8;
                Color::rgba(
                    mix(dst.r, src.r),
                    mix(dst.g, src.g),
                    mix(dst.b, src.b),
                    dst.a.max(src.a),
                )
            }
            BlendMode::Add => dst.saturating_add(src),
            BlendMode::Multiply => dst.modulate(src.with_alpha(255)),
        }
    }
}

/// Borrowed pixels, row-major with the top row (smallest world Y) first.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    pub size: UVec2,
    pub pixels: &'a [Color],
}

impl Image<'_> {
    /// Nearest pixel to normalized coordinates `uv` in `[0, 1]`.
    pub fn sample(&self, uv: Vec2) -> Color {
        if self.size.x == 0 || self.size.y == 0 {
            return Color::TRANSPARENT;
        }
        let p = (uv * self.size.as_vec2())
            .floor()
            .as_uvec2()
            .min(self.size - UVec2::ONE);
        self.pixels
            .get((p.y * self.size.x + p.x) as usize)
            .copied()
            .unwrap_or(Color::TRANSPARENT)
    }
}

/// Drawable surface in world coordinates.
pub trait Canvas {
    fn fill_triangle(&mut self, vertices: [Vec2; 3], color: Color, blend: BlendMode);

    /// Draw `image` with its top-left corner at `top_left`, each pixel covering
    /// `pixel_size` world units.
    fn draw_image(&mut self, image: Image<'_>, top_left: Vec2, pixel_size: Vec2, blend: BlendMode);
}

/// Resolves sprite ids to image data.
pub trait SpriteProvider {
    fn sprite(&self, id: SpriteId) -> Option<Image<'_>>;
}

/// In-memory sprite table.
#[derive(Debug, Default)]
pub struct SpriteSheet {
    sprites: HashMap<SpriteId, (UVec2, Vec<Color>)>,
}

impl SpriteSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if `pixels` does not hold `size.x * size.y` colors.
    pub fn insert(&mut self, id: SpriteId, size: UVec2, pixels: Vec<Color>) {
        assert_eq!(pixels.len(), (size.x * size.y) as usize, "sprite size mismatch");
        self.sprites.insert(id, (size, pixels));
    }

    /// White disc fading linearly to black at its rim.
    pub fn insert_radial_glow(&mut self, id: SpriteId, diameter: u32) {
        let d = diameter.max(1);
        let r = d as f32 / 2.0;
        let pixels = (0..d * d)
            .map(|i| {
                let p = Vec2::new((i % d) as f32 + 0.5, (i / d) as f32 + 0.5);
                Color::WHITE.scaled(1.0 - p.distance(Vec2::splat(r)) / r)
            })
            .collect();
        self.insert(id, UVec2::splat(d), pixels);
    }
}

impl SpriteProvider for SpriteSheet {
    fn sprite(&self, id: SpriteId) -> Option<Image<'_>> {
        self.sprites.get(&id).map(|(size, pixels)| Image {
            size: *size,
            pixels,
        })
    }
}

/// Software canvas: a pixel grid laid over a world-space rectangle.
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    size: UVec2,
    origin: Vec2,
    pixel_size: f32,
    pixels: Vec<Color>,
}

impl PixelCanvas {
    pub fn new(size: UVec2, origin: Vec2, pixel_size: f32, clear: Color) -> Self {
        Self {
            size,
            origin,
            pixel_size,
            pixels: vec![clear; (size.x * size.y) as usize],
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        (x < self.size.x && y < self.size.y)
            .then(|| self.pixels[(y * self.size.x + x) as usize])
    }

    fn pixel_center(&self, x: u32, y: u32) -> Vec2 {
        self.origin + (Vec2::new(x as f32, y as f32) + 0.5) * self.pixel_size
    }

    /// Pixel range covering the world-space box `[min, max]`, clamped to the canvas.
    fn pixel_span(&self, min: Vec2, max: Vec2) -> (UVec2, UVec2) {
        let lo = ((min - self.origin) / self.pixel_size).floor().max(Vec2::ZERO);
        let hi = ((max - self.origin) / self.pixel_size)
            .ceil()
            .min(self.size.as_vec2());
        (lo.as_uvec2(), hi.as_uvec2())
    }

    fn blend_at(&mut self, x: u32, y: u32, color: Color, blend: BlendMode) {
        let i = (y * self.size.x + x) as usize;
        self.pixels[i] = blend.apply(self.pixels[i], color);
    }
}

impl Canvas for PixelCanvas {
    fn fill_triangle(&mut self, [a, b, c]: [Vec2; 3], color: Color, blend: BlendMode) {
        let area = (b - a).perp_dot(c - a);
        if area == 0.0 {
            return;
        }
        let (lo, hi) = self.pixel_span(a.min(b).min(c), a.max(b).max(c));
        for y in lo.y..hi.y {
            for x in lo.x..hi.x {
                let p = self.pixel_center(x, y);
                let w0 = (b - a).perp_dot(p - a) / area;
                let w1 = (c - b).perp_dot(p - b) / area;
                let w2 = (a - c).perp_dot(p - c) / area;
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    self.blend_at(x, y, color, blend);
                }
            }
        }
    }

    fn draw_image(&mut self, image: Image<'_>, top_left: Vec2, pixel_size: Vec2, blend: BlendMode) {
        let extent = image.size.as_vec2() * pixel_size;
        let (lo, hi) = self.pixel_span(top_left, top_left + extent);
        for y in lo.y..hi.y {
            for x in lo.x..hi.x {
                let uv = (self.pixel_center(x, y) - top_left) / extent;
                if uv.cmplt(Vec2::ZERO).any() || uv.cmpge(Vec2::ONE).any() {
                    continue;
                }
                self.blend_at(x, y, image.sample(uv), blend);
            }
        }
    }
}
