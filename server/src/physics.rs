//! Authoritative entity registry and kinematic integration.
//!
//! Entities live in an arena of slots addressed through an id index. A second
//! index groups entity ids by room so per-room snapshots never scan the whole
//! registry.

use crate::room::RoomId;
use roomworld_shared::vec2::{add, length, point_in_polygon, scale, Vec2};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type EntityId = u32;

/// Anything with a position and a velocity.
pub trait HasKinematics {
    fn position(&self) -> Vec2;
    fn velocity(&self) -> Vec2;
    fn set_position(&mut self, position: Vec2);
    fn set_velocity(&mut self, velocity: Vec2);

    fn speed(&self) -> f64 {
        length(self.velocity())
    }
}

/// Plain moving body.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl HasKinematics for Body {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn velocity(&self) -> Vec2 {
        self.velocity
    }

    fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }
}

/// An object within the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    body: Body,
    room: Option<RoomId>,
    is_moving: bool,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id,
            name: name.into(),
            body: Body {
                position,
                velocity: Vec2::ZERO,
            },
            room: None,
            is_moving: false,
        }
    }

    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.body.velocity = velocity;
        self
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }
}

impl HasKinematics for Entity {
    fn position(&self) -> Vec2 {
        self.body.position
    }

    fn velocity(&self) -> Vec2 {
        self.body.velocity
    }

    fn set_position(&mut self, position: Vec2) {
        self.body.position = position;
    }

    fn set_velocity(&mut self, velocity: Vec2) {
        self.body.velocity = velocity;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhysicsError {
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),
    #[error("entity {0} not found")]
    NotFound(EntityId),
}

#[derive(Debug, Default)]
pub struct PhysicsEngine {
    slots: Vec<Option<Entity>>,
    free: Vec<usize>,
    index: HashMap<EntityId, usize>,
    rooms: HashMap<RoomId, BTreeSet<EntityId>>,
    bounds: HashMap<RoomId, Vec<Vec2>>,
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confine entities of `room` to `polygon`.
    pub fn set_room_bounds(&mut self, room: RoomId, polygon: Vec<Vec2>) {
        self.bounds.insert(room, polygon);
    }

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), PhysicsError> {
        if self.index.contains_key(&entity.id) {
            return Err(PhysicsError::DuplicateEntity(entity.id));
        }

        let id = entity.id;
        if let Some(room) = entity.room {
            self.rooms.entry(room).or_default().insert(id);
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entity);
                slot
            }
            None => {
                self.slots.push(Some(entity));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        Ok(())
    }

    /// Deregister an entity. Removing an absent id is a no-op.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.index.remove(&id)?;
        let entity = self.slots[slot].take()?;
        self.free.push(slot);
        if let Some(room) = entity.room {
            self.unindex_room(room, id);
        }
        Some(entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref()
    }

    fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec2) -> Result<(), PhysicsError> {
        let entity = self.get_mut(id).ok_or(PhysicsError::NotFound(id))?;
        entity.set_velocity(velocity);
        Ok(())
    }

    /// Move an entity into `room` at `position`, keeping the room index current.
    pub fn set_room(
        &mut self,
        id: EntityId,
        room: RoomId,
        position: Vec2,
    ) -> Result<(), PhysicsError> {
        let entity = self.get_mut(id).ok_or(PhysicsError::NotFound(id))?;
        let previous = entity.room.replace(room);
        entity.set_position(position);

        if let Some(previous) = previous {
            if previous != room {
                self.unindex_room(previous, id);
            }
        }
        self.rooms.entry(room).or_default().insert(id);
        Ok(())
    }

    /// Integrate every entity by `velocity * dt` (explicit Euler, dt in seconds).
    pub fn update(&mut self, dt: f64) {
        let bounds = &self.bounds;
        for entity in self.slots.iter_mut().flatten() {
            let velocity = entity.velocity();
            let from = entity.position();
            let proposed = add(from, scale(velocity, dt));

            let polygon = entity.room.and_then(|room| bounds.get(&room));
            let next = match polygon {
                Some(polygon) => constrain(from, proposed, polygon),
                None => proposed,
            };

            entity.set_position(next);
            entity.is_moving = entity.speed() > 0.0;
        }
    }

    /// Read view of the registry keyed by id.
    pub fn entity_list(&self) -> BTreeMap<EntityId, &Entity> {
        self.slots
            .iter()
            .flatten()
            .map(|entity| (entity.id, entity))
            .collect()
    }

    /// Entities currently in `room`, ordered by id.
    ///
    /// Fails with `NotFound` if the room index names an entity the registry
    /// no longer holds.
    pub fn entities_in_room(&self, room: RoomId) -> Result<Vec<&Entity>, PhysicsError> {
        let Some(ids) = self.rooms.get(&room) else {
            return Ok(Vec::new());
        };
        ids.iter()
            .map(|id| self.get(*id).ok_or(PhysicsError::NotFound(*id)))
            .collect()
    }

    /// Drop room index entries whose entity is gone or lives elsewhere.
    /// Returns the number of entries removed.
    pub fn repair_room_index(&mut self, room: RoomId) -> usize {
        let Some(ids) = self.rooms.get(&room) else {
            return 0;
        };
        let stale: Vec<EntityId> = ids
            .iter()
            .copied()
            .filter(|id| self.get(*id).and_then(|e| e.room) != Some(room))
            .collect();
        for id in &stale {
            self.unindex_room(room, *id);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn unindex_room(&mut self, room: RoomId, id: EntityId) {
        if let Some(ids) = self.rooms.get_mut(&room) {
            ids.remove(&id);
            if ids.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }

    /// List `id` under `room` without touching the registry.
    #[cfg(test)]
    pub(crate) fn index_stale_entry(&mut self, room: RoomId, id: EntityId) {
        self.rooms.entry(room).or_default().insert(id);
    }
}

/// Keep a step inside `polygon`, sliding along walls when only one axis is blocked.
fn constrain(from: Vec2, proposed: Vec2, polygon: &[Vec2]) -> Vec2 {
    if point_in_polygon(proposed, polygon) {
        return proposed;
    }
    let x_only = Vec2::new(proposed.x, from.y);
    if point_in_polygon(x_only, polygon) {
        return x_only;
    }
    let y_only = Vec2::new(from.x, proposed.y);
    if point_in_polygon(y_only, polygon) {
        return y_only;
    }
    from
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomworld_shared::vec2::vec2;

    const EPS: f64 = 1e-9;
    const LOBBY: RoomId = RoomId(0);
    const GARDEN: RoomId = RoomId(1);

    fn square(min: f64, max: f64) -> Vec<Vec2> {
        vec![vec2(min, min), vec2(max, min), vec2(max, max), vec2(min, max)]
    }

    #[test]
    fn add_then_duplicate_fails() {
        let mut physics = PhysicsEngine::new();
        physics.add_entity(Entity::new(1, "a", Vec2::ZERO)).unwrap();
        assert_eq!(
            physics.add_entity(Entity::new(1, "b", Vec2::ZERO)),
            Err(PhysicsError::DuplicateEntity(1))
        );
        assert_eq!(physics.get(1).unwrap().name, "a");
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut physics = PhysicsEngine::new();
        physics.add_entity(Entity::new(1, "a", Vec2::ZERO)).unwrap();
        assert!(physics.remove_entity(1).is_some());
        assert!(physics.remove_entity(1).is_none());
        assert!(physics.remove_entity(99).is_none());
        assert!(physics.is_empty());
    }

    #[test]
    fn slots_are_reused() {
        let mut physics = PhysicsEngine::new();
        physics.add_entity(Entity::new(1, "a", Vec2::ZERO)).unwrap();
        physics.add_entity(Entity::new(2, "b", Vec2::ZERO)).unwrap();
        physics.remove_entity(1);
        physics.add_entity(Entity::new(3, "c", Vec2::ZERO)).unwrap();
        assert_eq!(physics.slots.len(), 2);
        assert_eq!(physics.get(3).unwrap().name, "c");
        assert_eq!(physics.get(2).unwrap().name, "b");
    }

    #[test]
    fn one_second_at_unit_velocity_moves_one_unit() {
        let mut physics = PhysicsEngine::new();
        physics
            .add_entity(Entity::new(1, "a", vec2(5.0, 5.0)).with_velocity(vec2(1.0, 0.0)))
            .unwrap();
        physics.update(1.0);

        let e = physics.get(1).unwrap();
        assert!((e.position().x - 6.0).abs() < EPS);
        assert!((e.position().y - 5.0).abs() < EPS);
        assert!(e.is_moving());
    }

    #[test]
    fn zero_velocity_is_not_moving() {
        let mut physics = PhysicsEngine::new();
        physics
            .add_entity(Entity::new(1, "a", vec2(5.0, 5.0)).with_velocity(vec2(1.0, 0.0)))
            .unwrap();
        physics.update(0.5);
        assert!(physics.get(1).unwrap().is_moving());

        physics.set_velocity(1, Vec2::ZERO).unwrap();
        physics.update(0.5);
        let e = physics.get(1).unwrap();
        assert!(!e.is_moving());
        assert!((e.position().x - 5.5).abs() < EPS);
    }

    #[test]
    fn set_velocity_unknown_entity_fails() {
        let mut physics = PhysicsEngine::new();
        assert_eq!(
            physics.set_velocity(7, vec2(1.0, 1.0)),
            Err(PhysicsError::NotFound(7))
        );
    }

    #[test]
    fn room_index_follows_room_changes() {
        let mut physics = PhysicsEngine::new();
        physics
            .add_entity(Entity::new(2, "b", vec2(1.0, 1.0)).in_room(LOBBY))
            .unwrap();
        physics
            .add_entity(Entity::new(1, "a", vec2(1.0, 1.0)).in_room(LOBBY))
            .unwrap();

        let ids: Vec<EntityId> = physics
            .entities_in_room(LOBBY)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        physics.set_room(1, GARDEN, vec2(3.0, 4.0)).unwrap();
        assert_eq!(physics.entities_in_room(LOBBY).unwrap().len(), 1);
        let garden = physics.entities_in_room(GARDEN).unwrap();
        assert_eq!(garden.len(), 1);
        assert_eq!(garden[0].position(), vec2(3.0, 4.0));

        physics.remove_entity(2);
        assert!(physics.entities_in_room(LOBBY).unwrap().is_empty());
    }

    #[test]
    fn entity_without_room_is_in_no_room_snapshot() {
        let mut physics = PhysicsEngine::new();
        physics.add_entity(Entity::new(1, "a", Vec2::ZERO)).unwrap();
        assert!(physics.entities_in_room(LOBBY).unwrap().is_empty());
        assert_eq!(physics.entity_list().len(), 1);
    }

    #[test]
    fn stale_room_index_is_reported_and_repaired() {
        let mut physics = PhysicsEngine::new();
        physics
            .add_entity(Entity::new(1, "a", Vec2::ZERO).in_room(LOBBY))
            .unwrap();
        physics.index_stale_entry(LOBBY, 42);

        assert_eq!(
            physics.entities_in_room(LOBBY),
            Err(PhysicsError::NotFound(42))
        );
        assert_eq!(physics.repair_room_index(LOBBY), 1);
        assert_eq!(physics.entities_in_room(LOBBY).unwrap().len(), 1);
    }

    #[test]
    fn bounds_block_leaving_room() {
        let mut physics = PhysicsEngine::new();
        physics.set_room_bounds(LOBBY, square(1.0, 23.0));
        physics
            .add_entity(
                Entity::new(1, "a", vec2(22.5, 10.0))
                    .in_room(LOBBY)
                    .with_velocity(vec2(1.0, 0.0)),
            )
            .unwrap();
        physics.update(1.0);
        let e = physics.get(1).unwrap();
        assert!((e.position().x - 22.5).abs() < EPS);
        // Still pushing against the wall.
        assert!(e.is_moving());
    }

    #[test]
    fn bounds_slide_along_wall() {
        let mut physics = PhysicsEngine::new();
        physics.set_room_bounds(LOBBY, square(1.0, 23.0));
        physics
            .add_entity(
                Entity::new(1, "a", vec2(22.5, 10.0))
                    .in_room(LOBBY)
                    .with_velocity(vec2(1.0, 1.0)),
            )
            .unwrap();
        physics.update(1.0);
        let e = physics.get(1).unwrap();
        assert!((e.position().x - 22.5).abs() < EPS);
        assert!((e.position().y - 11.0).abs() < EPS);
    }

    #[test]
    fn bounds_of_other_rooms_do_not_apply() {
        let mut physics = PhysicsEngine::new();
        physics.set_room_bounds(GARDEN, square(1.0, 2.0));
        physics
            .add_entity(
                Entity::new(1, "a", vec2(10.0, 10.0))
                    .in_room(LOBBY)
                    .with_velocity(vec2(0.0, -2.0)),
            )
            .unwrap();
        physics.update(0.5);
        assert!((physics.get(1).unwrap().position().y - 9.0).abs() < EPS);
    }
}
