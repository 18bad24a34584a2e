use std::collections::HashMap;

use glam::{UVec2, Vec2};
use gridspace_common::{Color, LightId};
use gridspace_kernel::{Light, World};

use crate::canvas::{BlendMode, Canvas, Image, SpriteProvider};
use crate::visibility::{VisibilityCalculator, VisibilityCalculatorConfig};

/// World-space square covered by the light buffer in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    top_left: Vec2,
    side: f32,
}

impl Frame {
    /// Smallest square centered on the view that contains all of it.
    fn covering(center: Vec2, size: Vec2) -> Self {
        let side = size.x.abs().max(size.y.abs()).max(f32::MIN_POSITIVE);
        Self {
            top_left: center - Vec2::splat(side / 2.0),
            side,
        }
    }

    fn pixel_size(&self, texture_size: UVec2) -> Vec2 {
        Vec2::splat(self.side) / texture_size.as_vec2()
    }
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Idle,
    /// A transfer was started for this frame and completes by the next step.
    InFlight(Frame),
}

/// One readback buffer. Rows are stored bottom-up, the way a render target reads back.
#[derive(Debug, Default)]
struct ReadbackSlot {
    bytes: Vec<u8>,
    state: SlotState,
}

/// Renders dynamic lights into an off-screen buffer and answers color queries from a
/// readback of the previous frame.
///
/// # Invariants
/// - Each readback slot is written only when a transfer starts into it and read only
///   when that transfer completes, one step later.
/// - [`LightingRenderer::get_color_at`] never observes the frame being prepared.
pub struct LightingRenderer {
    texture_size: UVec2,
    visibility: VisibilityCalculatorConfig,
    calculators: HashMap<LightId, VisibilityCalculator>,
    target: Vec<Color>,
    frame: Option<Frame>,
    slots: [ReadbackSlot; 2],
    step: u64,
    readback: Vec<Color>,
    readback_frame: Option<Frame>,
}

impl LightingRenderer {
    /// Texture dimensions are clamped to at least one pixel.
    pub fn new(texture_size: UVec2, visibility: VisibilityCalculatorConfig) -> Self {
        let texture_size = texture_size.max(UVec2::ONE);
        Self {
            texture_size,
            visibility,
            calculators: HashMap::new(),
            target: vec![Color::BLACK; (texture_size.x * texture_size.y) as usize],
            frame: None,
            slots: Default::default(),
            step: 0,
            readback: Vec::new(),
            readback_frame: None,
        }
    }

    pub fn texture_size(&self) -> UVec2 {
        self.texture_size
    }

    /// Number of `prepare_to_render` calls so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Render every active light for a view, start reading the result back and complete
    /// the readback started by the previous call.
    pub fn prepare_to_render(
        &mut self,
        world: &World,
        sprites: &dyn SpriteProvider,
        view_center: Vec2,
        view_size: Vec2,
    ) {
        let _span = tracing::debug_span!("prepare_lighting", step = self.step + 1).entered();
        self.step += 1;
        let frame = Frame::covering(view_center, view_size);
        self.draw_lights(world, sprites, frame);
        self.frame = Some(frame);

        let start = (self.step % 2) as usize;
        let finish = ((self.step + 1) % 2) as usize;
        self.complete_transfer(finish);
        self.start_transfer(start, frame);
    }

    fn draw_lights(&mut self, world: &World, sprites: &dyn SpriteProvider, frame: Frame) {
        self.target.fill(Color::BLACK);
        let lights = world.dynamic_lights();
        self.calculators
            .retain(|id, _| lights.iter().any(|l| l.id() == *id));
        for light in lights {
            let calc = self
                .calculators
                .entry(light.id())
                .or_insert_with(|| VisibilityCalculator::new(self.visibility));
            calc.calc(
                world,
                light.center(),
                Vec2::splat(light.radius() * 2.0),
                light.center(),
            );
            splat_light(&mut self.target, self.texture_size, frame, light, calc, sprites);
        }
        tracing::trace!(lights = lights.len(), "lights drawn");
    }

    fn start_transfer(&mut self, slot: usize, frame: Frame) {
        let width = self.texture_size.x as usize;
        let slot = &mut self.slots[slot];
        slot.bytes.clear();
        for row in self.target.chunks_exact(width).rev() {
            slot.bytes.extend_from_slice(bytemuck::cast_slice(row));
        }
        slot.state = SlotState::InFlight(frame);
    }

    fn complete_transfer(&mut self, slot: usize) {
        let slot = &mut self.slots[slot];
        if let SlotState::InFlight(frame) = std::mem::take(&mut slot.state) {
            self.readback.clear();
            self.readback
                .extend_from_slice(bytemuck::cast_slice::<u8, Color>(&slot.bytes));
            self.readback_frame = Some(frame);
        }
    }

    /// Light color at a world position as of the previous `prepare_to_render` call, or
    /// `None` before two calls were made or outside that frame.
    pub fn get_color_at(&self, pos: Vec2) -> Option<Color> {
        let frame = self.readback_frame?;
        let size = self.texture_size;
        let p = ((pos - frame.top_left) / frame.pixel_size(size)).floor();
        if p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let p = p.as_uvec2();
        if p.x >= size.x || p.y >= size.y {
            return None;
        }
        // Readback rows are bottom-up; world Y grows downwards.
        let row = size.y - 1 - p.y;
        self.readback.get((row * size.x + p.x) as usize).copied()
    }

    /// Multiply the light buffer of the latest frame over `canvas`.
    pub fn render(&self, canvas: &mut dyn Canvas) {
        let Some(frame) = self.frame else {
            return;
        };
        let image = Image {
            size: self.texture_size,
            pixels: &self.target,
        };
        canvas.draw_image(
            image,
            frame.top_left,
            frame.pixel_size(self.texture_size),
            BlendMode::Multiply,
        );
    }
}

/// Add one light's visible contribution to the buffer.
fn splat_light(
    target: &mut [Color],
    texture_size: UVec2,
    frame: Frame,
    light: &Light,
    calc: &VisibilityCalculator,
    sprites: &dyn SpriteProvider,
) {
    let radius = light.radius();
    if radius <= 0.0 {
        return;
    }
    let px = frame.pixel_size(texture_size);
    let center = light.center();
    let lo = ((center - radius - frame.top_left) / px)
        .floor()
        .max(Vec2::ZERO)
        .as_uvec2();
    let hi = ((center + radius - frame.top_left) / px)
        .ceil()
        .max(Vec2::ZERO)
        .as_uvec2()
        .min(texture_size);
    let sprite = sprites.sprite(light.sprite_id());
    if sprite.is_none() {
        tracing::trace!(light = light.id(), sprite = light.sprite_id(), "no glow sprite, using falloff");
    }

    // The light is resolved on its own texel grid spanning its diameter.
    let texels = light.texture_size().max(UVec2::ONE).as_vec2();
    for y in lo.y..hi.y {
        for x in lo.x..hi.x {
            let pos = frame.top_left + (Vec2::new(x as f32, y as f32) + 0.5) * px;
            let offset = pos - center;
            if offset.length() > radius {
                continue;
            }
            let texel = ((offset + radius) / (2.0 * radius) * texels)
                .floor()
                .clamp(Vec2::ZERO, texels - 1.0);
            let uv = (texel + 0.5) / texels;
            let sample = center + uv * (2.0 * radius) - radius;
            let glow = match &sprite {
                Some(image) => image.sample(uv),
                None => Color::WHITE.scaled(1.0 - sample.distance(center) / radius),
            };
            if calc.test_visibility_at(sample) != Some(true) {
                continue;
            }
            let i = (y * texture_size.x + x) as usize;
            target[i] = target[i].saturating_add(light.color().modulate(glow).with_alpha(255));
        }
    }
}
