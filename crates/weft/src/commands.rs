//! Deferred world mutation from inside systems.

use std::{marker::PhantomData, ptr::NonNull};

use tracing::debug;

use crate::{
    Component, World, bundle::Bundle, entity_id::EntityId, query::WorldQuery,
};

pub(crate) type CommandBuffer = Vec<Box<dyn FnOnce(&mut World)>>;

/// Queues world mutations while a stage runs.
///
/// Each system gets its own buffer; `run_stage` applies all buffers after
/// the last system finished, in system order, preserving recording order
/// within a system. Commands against entities that died before application
/// are skipped, not errors.
pub struct Commands<'a> {
    world: NonNull<World>,
    buffer: NonNull<CommandBuffer>,
    _m: PhantomData<&'a mut ()>,
}

impl<'a> WorldQuery<'a> for Commands<'a> {
    fn new(world: &'a World, system_idx: usize) -> Self {
        Self {
            world: NonNull::from(world),
            buffer: world.command_buffer(system_idx),
            _m: PhantomData,
        }
    }
    // no access sets: buffers are per-system and applied under &mut World
}

impl<'a> Commands<'a> {
    /// Queue spawning a new entity.
    ///
    /// The id is reserved immediately and can be stored or handed to other
    /// commands; the entity becomes alive when the stage's commands are
    /// applied.
    pub fn spawn(&mut self) -> EntityCommands<'a, '_> {
        let id = unsafe { self.world.as_ref() }.reserve_entity();
        self.push(move |world| world.spawn_reserved(id));
        EntityCommands { id, commands: self }
    }

    /// Queue mutations of an existing entity.
    pub fn entity(&mut self, id: EntityId) -> EntityCommands<'a, '_> {
        EntityCommands { id, commands: self }
    }

    /// Queue deleting an entity.
    pub fn delete(&mut self, id: EntityId) {
        self.push(move |world| {
            if let Err(err) = world.delete_entity(id) {
                debug!(entity = %id, error = %err, "skipping delete of a dead entity");
            }
        });
    }

    fn push(&mut self, command: impl FnOnce(&mut World) + 'static) {
        // One system owns one buffer; nothing else touches it mid-stage.
        unsafe { self.buffer.as_mut() }.push(Box::new(command));
    }
}

/// Builder for commands targeting one entity.
pub struct EntityCommands<'a, 'c> {
    id: EntityId,
    commands: &'c mut Commands<'a>,
}

impl EntityCommands<'_, '_> {
    /// The id of the targeted entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Queue storing `bundle` on the entity.
    pub fn insert<B: Bundle>(self, bundle: B) -> Self {
        let id = self.id;
        self.commands.push(move |world| {
            if let Err(err) = world.set_bundle(id, bundle) {
                debug!(entity = %id, error = %err, "skipping insert on a dead entity");
            }
        });
        self
    }

    /// Queue removing the entity's `T` component.
    pub fn remove<T: Component>(self) -> Self {
        let id = self.id;
        self.commands.push(move |world| {
            if let Err(err) = world.remove_component::<T>(id) {
                debug!(entity = %id, error = %err, "skipping component removal");
            }
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pos(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Marker;

    #[test]
    fn test_spawn_is_deferred_until_stage_end() {
        let mut world = World::new();

        fn spawner(mut cmd: Commands) {
            cmd.spawn().insert((Pos(1),));
        }
        fn observer(q: Query<&Pos>) {
            // spawns from the same stage are not visible yet
            assert_eq!(q.count(), 0);
        }

        let stage = SystemStage::new("spawn")
            .with_system(spawner)
            .with_system(observer);
        world.run_stage(&stage);

        assert_eq!(world.len(), 1);
        let q = Query::<&Pos>::new(&world);
        assert_eq!(q.count(), 1);
    }

    #[test]
    fn test_spawned_id_is_usable_immediately() {
        let mut world = World::new();
        world.insert_resource(Option::<EntityId>::None);

        fn spawner(mut cmd: Commands, mut target: ResMut<Option<EntityId>>) {
            let id = cmd.spawn().insert((Pos(9),)).id();
            *target = Some(id);
        }
        world.run_system(spawner);

        let id = world.get_resource::<Option<EntityId>>().unwrap().unwrap();
        assert_eq!(world.get_component::<Pos>(id), Some(&Pos(9)));
    }

    #[test]
    fn test_deferred_delete_and_remove() {
        let mut world = World::new();
        let id = world.insert((Pos(1), Marker)).unwrap();

        fn untag(q: Query<EntityId, With<Marker>>, mut cmd: Commands) {
            for id in q.iter() {
                cmd.entity(id).remove::<Marker>();
            }
        }
        world.run_system(untag);
        assert!(world.is_alive(id));
        assert!(!world.has_component::<Marker>(id));
        assert_eq!(world.get_component::<Pos>(id), Some(&Pos(1)));

        fn reaper(q: Query<EntityId>, mut cmd: Commands) {
            for id in q.iter() {
                cmd.delete(id);
            }
        }
        world.run_system(reaper);
        assert!(!world.is_alive(id));
    }

    #[test]
    fn test_commands_against_dead_entities_are_skipped() {
        let mut world = World::new();
        let id = world.insert((Pos(1),)).unwrap();

        fn doubled(q: Query<EntityId>, mut cmd: Commands) {
            for id in q.iter() {
                cmd.delete(id);
                // queued twice: the second application is a no-op
                cmd.delete(id);
                cmd.entity(id).insert((Marker,));
            }
        }
        world.run_system(doubled);
        assert!(!world.is_alive(id));
        assert_eq!(world.len(), 0);
    }
}
