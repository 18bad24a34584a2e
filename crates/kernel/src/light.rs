use glam::{UVec2, Vec2};
use gridspace_common::{Color, LightId, SpriteId};

/// Dynamic light source. Moving or resizing it marks it dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    id: LightId,
    center: Vec2,
    radius: f32,
    color: Color,
    sprite_id: SpriteId,
    /// Resolution of the light's own render buffer.
    texture_size: UVec2,
    dirty: bool,
}

impl Light {
    pub fn id(&self) -> LightId {
        self.id
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.center = center;
        self.dirty = true;
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.dirty = true;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        self.dirty = true;
    }

    pub fn sprite_id(&self) -> SpriteId {
        self.sprite_id
    }

    pub fn texture_size(&self) -> UVec2 {
        self.texture_size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// Owns every light of a world. Ids come from a counter and are never reused.
#[derive(Debug, Default)]
pub(crate) struct LightRegistry {
    next_id: LightId,
    dynamic: Vec<Light>,
    inactive: Vec<Light>,
}

impl LightRegistry {
    pub fn create(
        &mut self,
        center: Vec2,
        radius: f32,
        color: Color,
        sprite_id: SpriteId,
        texture_size: UVec2,
    ) -> LightId {
        let id = self.next_id;
        self.next_id += 1;
        self.dynamic.push(Light {
            id,
            center,
            radius,
            color,
            sprite_id,
            texture_size,
            dirty: true,
        });
        tracing::debug!(id, "created dynamic light");
        id
    }

    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.dynamic
            .iter()
            .chain(self.inactive.iter())
            .find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.dynamic
            .iter_mut()
            .chain(self.inactive.iter_mut())
            .find(|l| l.id == id)
    }

    pub fn dynamic(&self) -> &[Light] {
        &self.dynamic
    }

    pub fn dynamic_mut(&mut self) -> &mut [Light] {
        &mut self.dynamic
    }

    pub fn inactive(&self) -> &[Light] {
        &self.inactive
    }

    pub fn deactivate(&mut self, id: LightId) -> bool {
        move_light(&mut self.dynamic, &mut self.inactive, id)
    }

    pub fn activate(&mut self, id: LightId) -> bool {
        let moved = move_light(&mut self.inactive, &mut self.dynamic, id);
        if let Some(light) = self.dynamic.last_mut().filter(|_| moved) {
            light.dirty = true;
        }
        moved
    }

    pub fn destroy(&mut self, id: LightId) -> bool {
        let before = self.dynamic.len() + self.inactive.len();
        self.dynamic.retain(|l| l.id != id);
        self.inactive.retain(|l| l.id != id);
        before != self.dynamic.len() + self.inactive.len()
    }
}

fn move_light(from: &mut Vec<Light>, to: &mut Vec<Light>, id: LightId) -> bool {
    match from.iter().position(|l| l.id == id) {
        Some(i) => {
            to.push(from.remove(i));
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> (LightRegistry, Vec<LightId>) {
        let mut reg = LightRegistry::default();
        let ids = (0..n)
            .map(|i| {
                reg.create(
                    Vec2::splat(i as f32),
                    10.0,
                    Color::WHITE,
                    0,
                    UVec2::splat(64),
                )
            })
            .collect();
        (reg, ids)
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut reg, ids) = registry_with(3);
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(reg.destroy(ids[2]));
        let next = reg.create(Vec2::ZERO, 1.0, Color::BLACK, 0, UVec2::ONE);
        assert_eq!(next, 3);
        assert!(!reg.destroy(ids[2]));
    }

    #[test]
    fn deactivate_and_activate_move_between_pools() {
        let (mut reg, ids) = registry_with(2);
        assert!(reg.deactivate(ids[0]));
        assert_eq!(reg.dynamic().len(), 1);
        assert_eq!(reg.inactive().len(), 1);
        assert!(reg.get(ids[0]).is_some());
        assert!(!reg.deactivate(ids[0]));

        reg.get_mut(ids[1]).unwrap().clear_dirty();
        assert!(reg.activate(ids[0]));
        assert!(reg.inactive().is_empty());
        assert!(reg.get(ids[0]).unwrap().is_dirty());
    }

    #[test]
    fn setters_mark_dirty() {
        let (mut reg, ids) = registry_with(1);
        let light = reg.get_mut(ids[0]).unwrap();
        light.clear_dirty();
        light.set_radius(4.0);
        assert!(light.is_dirty());
        light.clear_dirty();
        light.set_center(Vec2::new(1.0, 2.0));
        assert!(light.is_dirty());
        assert_eq!(light.center(), Vec2::new(1.0, 2.0));
    }
}
