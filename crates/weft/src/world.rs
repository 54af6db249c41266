//! The world: entities, their components, resources, and stage execution.

use std::{
    any::{Any, TypeId},
    cell::UnsafeCell,
    collections::HashMap,
    ptr::NonNull,
};

use tracing::{debug, debug_span, trace};

use crate::{
    Component, TypeHash,
    archetype::ArchetypeStorage,
    bundle::Bundle,
    commands::CommandBuffer,
    entity_id::EntityId,
    entity_index::{EntityIndex, EntityLocation},
    error::{Error, Result},
    hash_ty,
    systems::{ErasedSystem, IntoSystem, SystemStage},
};

/// Container of all ECS state.
///
/// Structural changes (spawning, deleting, adding/removing components) go
/// through `&mut self`. While a stage runs, systems receive queries built
/// from a shared reference; the stage executor guarantees that systems with
/// conflicting access sets never observe each other mid-write.
pub struct World {
    entities: EntityIndex,
    archetypes: HashMap<TypeHash, ArchetypeStorage>,
    resources: HashMap<TypeId, UnsafeCell<Box<dyn Any>>>,
    command_buffers: Vec<UnsafeCell<CommandBuffer>>,
}

// Mutation through a shared World reference only happens inside run_stage,
// which holds &mut World and never schedules conflicting systems together.
unsafe impl Send for World {}
unsafe impl Sync for World {}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("archetypes", &self.archetypes.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl World {
    pub fn new() -> Self {
        let root = ArchetypeStorage::empty();
        let mut archetypes = HashMap::new();
        archetypes.insert(root.ty(), root);
        Self {
            entities: EntityIndex::new(),
            archetypes,
            resources: HashMap::new(),
            command_buffers: Vec::new(),
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Spawn an empty entity.
    pub fn insert_entity(&mut self) -> EntityId {
        let id = self.entities.allocate();
        self.spawn_reserved(id);
        id
    }

    /// Spawn an entity and store `bundle` on it.
    pub fn insert<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let id = self.insert_entity();
        self.set_bundle(id, bundle)?;
        Ok(id)
    }

    /// Delete an entity and drop all its components.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<()> {
        let EntityLocation { ty, row } = self
            .entities
            .location(id)
            .ok_or(Error::EntityNotFound(id))?;
        let archetype = self
            .archetypes
            .get_mut(&ty)
            .expect("entity location must point at an existing archetype");
        if let Some(moved) = archetype.remove(row) {
            self.entities.set_location(moved, EntityLocation { ty, row });
        }
        self.entities.free(id)?;
        trace!(entity = %id, "deleted entity");
        Ok(())
    }

    /// Store `value` as the entity's `T` component.
    ///
    /// Overwrites in place when the entity already has a `T`; otherwise the
    /// entity moves to the extended archetype, which is created on demand.
    pub fn set_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<()> {
        let EntityLocation { ty, row } = self
            .entities
            .location(id)
            .ok_or(Error::EntityNotFound(id))?;
        let archetype = self
            .archetypes
            .get_mut(&ty)
            .expect("entity location must point at an existing archetype");
        if archetype.contains_column::<T>() {
            archetype.set_component(row, value);
            return Ok(());
        }

        let new_ty = archetype.extended_hash::<T>();
        let mut src = self
            .archetypes
            .remove(&ty)
            .expect("entity location must point at an existing archetype");
        let dst = self.archetypes.entry(new_ty).or_insert_with(|| {
            debug!(
                component = std::any::type_name::<T>(),
                ty = new_ty,
                "creating archetype"
            );
            src.extend_with_column::<T>()
        });
        let (dst_row, moved) = src.move_entity(dst, row);
        dst.set_component(dst_row, value);
        self.archetypes.insert(ty, src);

        if let Some(moved) = moved {
            self.entities.set_location(moved, EntityLocation { ty, row });
        }
        self.entities
            .set_location(id, EntityLocation { ty: new_ty, row: dst_row });
        Ok(())
    }

    /// Remove and drop the entity's `T` component.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<()> {
        let EntityLocation { ty, row } = self
            .entities
            .location(id)
            .ok_or(Error::EntityNotFound(id))?;
        let mut src = self
            .archetypes
            .remove(&ty)
            .expect("entity location must point at an existing archetype");
        if !src.contains_column::<T>() {
            self.archetypes.insert(ty, src);
            return Err(Error::ComponentNotFound(id, std::any::type_name::<T>()));
        }

        let new_ty = src.extended_hash::<T>();
        let dst = self
            .archetypes
            .entry(new_ty)
            .or_insert_with(|| src.reduce_with_column::<T>());
        let (dst_row, moved) = src.move_entity(dst, row);
        self.archetypes.insert(ty, src);

        if let Some(moved) = moved {
            self.entities.set_location(moved, EntityLocation { ty, row });
        }
        self.entities
            .set_location(id, EntityLocation { ty: new_ty, row: dst_row });
        Ok(())
    }

    /// Store every component of `bundle` on the entity.
    pub fn set_bundle<B: Bundle>(&mut self, id: EntityId, bundle: B) -> Result<()> {
        bundle.store(self, id)
    }

    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        let EntityLocation { ty, row } = self.entities.location(id)?;
        self.archetypes.get(&ty)?.get_component(row)
    }

    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let EntityLocation { ty, row } = self.entities.location(id)?;
        self.archetypes.get_mut(&ty)?.get_component_mut(row)
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.entities
            .location(id)
            .and_then(|loc| self.archetypes.get(&loc.ty))
            .is_some_and(|archetype| archetype.contains_column::<T>())
    }

    /// Insert a resource, replacing any previous `T`.
    pub fn insert_resource<T: 'static>(&mut self, value: T) {
        self.resources
            .insert(TypeId::of::<T>(), UnsafeCell::new(Box::new(value)));
    }

    pub fn remove_resource<T: 'static>(&mut self) -> Option<T> {
        let cell = self.resources.remove(&TypeId::of::<T>())?;
        cell.into_inner().downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn get_resource<T: 'static>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|cell| unsafe { (*cell.get()).downcast_ref() })
    }

    pub fn get_resource_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|cell| cell.get_mut().downcast_mut())
    }

    /// Raw pointer to a resource, for `ResMut` access through a shared world
    /// reference. Aliasing is the stage scheduler's responsibility.
    pub(crate) fn resource_ptr<T: 'static>(&self) -> Option<NonNull<T>> {
        self.resources.get(&TypeId::of::<T>()).and_then(|cell| {
            let boxed = unsafe { &mut *cell.get() };
            boxed.downcast_mut::<T>().map(NonNull::from)
        })
    }

    /// Drop archetypes that no longer hold any entity.
    pub fn vacuum(&mut self) {
        let root = hash_ty::<()>();
        let before = self.archetypes.len();
        self.archetypes
            .retain(|ty, archetype| *ty == root || !archetype.is_empty());
        let dropped = before - self.archetypes.len();
        if dropped > 0 {
            debug!(dropped, "vacuumed empty archetypes");
        }
    }

    /// Run every system of the stage, then apply the commands they queued.
    pub fn run_stage(&mut self, stage: &SystemStage<'_>) {
        let _span = debug_span!("run_stage", stage = %stage.name).entered();
        self.prepare_command_buffers(stage.systems.len());
        {
            // Queries built by the systems never outlive this block.
            let world: &World = unsafe { std::mem::transmute(&*self) };
            execute_stage(world, &stage.systems);
        }
        self.apply_commands();
    }

    /// Run a single system outside of any stage.
    pub fn run_system<'a, S, P>(&mut self, system: S)
    where
        S: IntoSystem<'a, P, ()>,
    {
        let system = system.system();
        self.prepare_command_buffers(1);
        {
            let world: &World = unsafe { std::mem::transmute(&*self) };
            (system.execute)(world, 0);
        }
        self.apply_commands();
    }

    /// Size the per-system command buffers for a stage, dropping anything a
    /// previously panicked stage may have left behind.
    fn prepare_command_buffers(&mut self, count: usize) {
        for buffer in &mut self.command_buffers {
            buffer.get_mut().clear();
        }
        while self.command_buffers.len() < count {
            self.command_buffers.push(UnsafeCell::new(Vec::new()));
        }
    }

    fn apply_commands(&mut self) {
        let mut buffers = std::mem::take(&mut self.command_buffers);
        for buffer in &mut buffers {
            for command in buffer.get_mut().drain(..) {
                command(self);
            }
        }
        self.command_buffers = buffers;
    }

    /// Reserve an id without spawning; used by `Commands`.
    pub(crate) fn reserve_entity(&self) -> EntityId {
        self.entities.allocate()
    }

    /// Spawn a previously reserved id into the root archetype.
    pub(crate) fn spawn_reserved(&mut self, id: EntityId) {
        if !self.entities.is_valid(id) || self.entities.is_alive(id) {
            debug!(entity = %id, "skipping spawn of a stale reservation");
            return;
        }
        let root = hash_ty::<()>();
        let archetype = self
            .archetypes
            .get_mut(&root)
            .expect("the root archetype always exists");
        let row = archetype.insert_entity(id);
        self.entities
            .set_location(id, EntityLocation { ty: root, row });
    }

    pub(crate) fn command_buffer(&self, system_idx: usize) -> NonNull<CommandBuffer> {
        let cell = self
            .command_buffers
            .get(system_idx)
            .expect("command buffers are sized before a stage runs");
        unsafe { NonNull::new_unchecked(cell.get()) }
    }

    pub(crate) fn location(&self, id: EntityId) -> Option<EntityLocation> {
        self.entities.location(id)
    }

    pub(crate) fn archetype(&self, ty: TypeHash) -> Option<&ArchetypeStorage> {
        self.archetypes.get(&ty)
    }

    pub(crate) fn archetypes_iter(&self) -> impl Iterator<Item = &ArchetypeStorage> {
        self.archetypes.values()
    }

    #[cfg(feature = "serde")]
    pub(crate) fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .archetypes_iter()
            .flat_map(|archetype| archetype.entities().iter().map(|(_, id)| *id))
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(not(feature = "parallel"))]
fn execute_stage<'a>(world: &'a World, systems: &[ErasedSystem<'a, ()>]) {
    for (i, system) in systems.iter().enumerate() {
        let _span = debug_span!("system", name = system.name).entered();
        (system.execute)(world, i);
    }
}

/// Run the stage batch by batch; systems inside a batch have disjoint access
/// sets and run on their own threads.
#[cfg(feature = "parallel")]
fn execute_stage<'a>(world: &'a World, systems: &[ErasedSystem<'a, ()>]) {
    let schedule = crate::schedule::Schedule::of_systems(systems);
    for batch in &schedule.batches {
        match batch.as_slice() {
            [i] => {
                let system = &systems[*i];
                let _span = debug_span!("system", name = system.name).entered();
                (system.execute)(world, *i);
            }
            batch => {
                std::thread::scope(|scope| {
                    for &i in batch {
                        let system = &systems[i];
                        scope.spawn(move || {
                            let _span = debug_span!("system", name = system.name).entered();
                            (system.execute)(world, i);
                        });
                    }
                });
            }
        }
    }
}
