//! Entity id allocation and entity -> archetype row bookkeeping.

use std::sync::Mutex;

use crate::{
    RowIndex, TypeHash,
    entity_id::EntityId,
    error::{Error, Result},
    page_table::PageTable,
};

/// Where a live entity's components are stored.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EntityLocation {
    pub ty: TypeHash,
    pub row: RowIndex,
}

/// Allocates entity ids and maps live entities to their archetype row.
///
/// Allocation goes through a mutex so ids can be reserved from a shared
/// world reference while a stage is running (see `Commands::spawn`).
/// Everything else requires `&mut`.
pub(crate) struct EntityIndex {
    allocator: Mutex<SlotAllocator>,
    locations: PageTable<EntityLocation>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self {
            allocator: Mutex::new(SlotAllocator::default()),
            locations: PageTable::new(4),
        }
    }

    /// Reserve a fresh id. The entity is not alive until a location is set.
    pub fn allocate(&self) -> EntityId {
        self.allocator
            .lock()
            .expect("entity id allocator mutex poisoned")
            .allocate()
    }

    /// The id's generation matches its slot, i.e. it has been allocated and
    /// not yet freed.
    pub fn is_valid(&self, id: EntityId) -> bool {
        self.allocator
            .lock()
            .expect("entity id allocator mutex poisoned")
            .is_valid(id)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.location(id).is_some()
    }

    pub fn location(&self, id: EntityId) -> Option<EntityLocation> {
        if !self.is_valid(id) {
            return None;
        }
        self.locations.get(id.index()).copied()
    }

    pub fn set_location(&mut self, id: EntityId, location: EntityLocation) {
        debug_assert!(self.is_valid(id));
        self.locations.insert(id.index(), location);
    }

    /// Free the id, bumping the slot's generation so stale handles die.
    pub fn free(&mut self, id: EntityId) -> Result<()> {
        let mut allocator = self
            .allocator
            .lock()
            .expect("entity id allocator mutex poisoned");
        if !allocator.is_valid(id) {
            return Err(Error::EntityNotFound(id));
        }
        self.locations.remove(id.index());
        allocator.free(id);
        Ok(())
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.locations.len()
    }
}

#[derive(Default)]
struct SlotAllocator {
    /// Generation per slot. Starts at 1 so a zeroed id is never valid.
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl SlotAllocator {
    fn allocate(&mut self) -> EntityId {
        match self.free.pop() {
            Some(slot) => EntityId::new(slot, self.generations[slot as usize]),
            None => {
                self.generations.push(1);
                EntityId::new(self.generations.len() as u32 - 1, 1)
            }
        }
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.generations
            .get(id.index() as usize)
            .is_some_and(|g| *g == id.generation())
    }

    fn free(&mut self, id: EntityId) {
        let slot = id.index() as usize;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(id.index());
    }
}
