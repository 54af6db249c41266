//! Archetype storage: one table per distinct set of component types.

use std::{any::TypeId, collections::HashMap};

use crate::{Component, RowIndex, TypeHash, entity_id::EntityId, hash_ty, page_table::PageTable};

/// Storage for all entities sharing one set of component types.
///
/// Rows are dense: every column holds exactly the rows `0..rows`, in the
/// same order, which is what lets per-column iterators be zipped by queries.
#[derive(Clone)]
pub struct ArchetypeStorage {
    ty: TypeHash,
    rows: u32,
    entities: PageTable<EntityId>,
    components: HashMap<TypeId, ErasedPageTable>,
}

impl std::fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("rows", &self.rows)
            .field(
                "entities",
                &self
                    .entities
                    .iter()
                    .map(|(row_index, id)| (id.to_string(), row_index))
                    .collect::<Vec<_>>(),
            )
            .field(
                "components",
                &self
                    .components
                    .values()
                    .map(|c| c.ty_name)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ArchetypeStorage {
    /// The root archetype: entities with no components.
    pub(crate) fn empty() -> Self {
        let ty = hash_ty::<()>();
        let mut components = HashMap::new();
        components.insert(
            TypeId::of::<()>(),
            ErasedPageTable::new(PageTable::<()>::default()),
        );
        Self {
            ty,
            rows: 0,
            entities: PageTable::new(4),
            components,
        }
    }

    /// Get the archetype storage's ty.
    pub fn ty(&self) -> TypeHash {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the row at `row_index`, dropping its component values.
    ///
    /// The last row is swapped into the hole; the id of the entity that
    /// changed rows is returned so the caller can re-index it.
    pub(crate) fn remove(&mut self, row_index: RowIndex) -> Option<EntityId> {
        debug_assert!(row_index < self.rows);
        let last = self.rows - 1;
        for col in self.components.values_mut() {
            col.remove(row_index);
        }
        self.entities.remove(row_index);
        self.rows = last;
        if row_index == last {
            return None;
        }
        for col in self.components.values_mut() {
            col.move_slot(last, row_index);
        }
        let moved = self
            .entities
            .remove(last)
            .expect("dense archetype rows: last row must be occupied");
        self.entities.insert(row_index, moved);
        Some(moved)
    }

    pub(crate) fn insert_entity(&mut self, id: EntityId) -> RowIndex {
        let res = self.rows;
        self.entities.insert(res, id);
        self.rows += 1;
        res
    }

    /// Move the entity at `index` into `dst`.
    ///
    /// Columns present in both archetypes carry their value over; columns
    /// absent from `dst` drop theirs. Returns the entity's new row in `dst`
    /// and, as in [`ArchetypeStorage::remove`], the id of the entity swapped
    /// into the vacated row, if any.
    pub(crate) fn move_entity(
        &mut self,
        dst: &mut Self,
        index: RowIndex,
    ) -> (RowIndex, Option<EntityId>) {
        let last = self.rows - 1;
        let entity_id = self
            .entities
            .remove(index)
            .expect("dense archetype rows: moved row must be occupied");
        let dst_row = dst.insert_entity(entity_id);
        for (ty, col) in self.components.iter_mut() {
            match dst.components.get_mut(ty) {
                Some(dst_col) => (col.move_row)(col, dst_col, index, dst_row),
                None => {
                    col.remove(index);
                }
            }
        }
        self.rows = last;
        if index == last {
            return (dst_row, None);
        }
        for col in self.components.values_mut() {
            col.move_slot(last, index);
        }
        let moved = self
            .entities
            .remove(last)
            .expect("dense archetype rows: last row must be occupied");
        self.entities.insert(index, moved);
        (dst_row, Some(moved))
    }

    pub(crate) fn set_component<T: 'static>(&mut self, row_index: RowIndex, val: T) {
        unsafe {
            self.components
                .get_mut(&TypeId::of::<T>())
                .expect("set_component called on bad archetype")
                .as_inner_mut()
                .insert(row_index, val);
        }
    }

    pub fn contains_column<T: 'static>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn extended_hash<T: 'static>(&self) -> TypeHash {
        self.ty ^ hash_ty::<T>()
    }

    /// An empty archetype with this one's columns plus a `T` column.
    pub(crate) fn extend_with_column<T: Component>(&self) -> Self {
        debug_assert!(!self.contains_column::<T>());

        let mut result = self.clone_empty();
        result.ty = self.extended_hash::<T>();
        result.components.insert(
            TypeId::of::<T>(),
            ErasedPageTable::new::<T>(PageTable::default()),
        );
        result
    }

    /// An empty archetype with this one's columns minus the `T` column.
    pub(crate) fn reduce_with_column<T: Component>(&self) -> Self {
        debug_assert!(self.contains_column::<T>());

        let mut result = self.clone_empty();
        result.ty = self.extended_hash::<T>();
        result.components.remove(&TypeId::of::<T>());
        result
    }

    pub(crate) fn clone_empty(&self) -> Self {
        Self {
            ty: self.ty,
            rows: 0,
            entities: PageTable::new(self.entities.len()),
            components: HashMap::from_iter(
                self.components
                    .iter()
                    .map(|(id, col)| (*id, (col.clone_empty)())),
            ),
        }
    }

    pub(crate) fn get_component<T: 'static>(&self, row: RowIndex) -> Option<&T> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|col| unsafe { col.as_inner().get(row) })
    }

    pub(crate) fn get_component_mut<T: 'static>(&mut self, row: RowIndex) -> Option<&mut T> {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|col| unsafe { col.as_inner_mut().get_mut(row) })
    }

    pub(crate) fn entity_at(&self, row: RowIndex) -> Option<EntityId> {
        self.entities.get(row).copied()
    }

    pub(crate) fn entities(&self) -> &PageTable<EntityId> {
        &self.entities
    }

    /// Shared-reference access to the `T` column.
    pub(crate) fn column<T: 'static>(&self) -> Option<&PageTable<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .map(|col| unsafe { col.as_inner::<T>() })
    }

    /// Raw access to the `T` column, for queries that mutate through a
    /// shared world reference. Aliasing is the stage executor's problem.
    pub(crate) fn column_ptr<T: 'static>(&self) -> Option<*mut PageTable<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .map(|col| unsafe { col.as_inner_ptr::<T>() })
    }
}

/// Type erased PageTable.
pub(crate) struct ErasedPageTable {
    ty_name: &'static str,
    inner: *mut std::ffi::c_void,
    finalize: fn(&mut ErasedPageTable),
    remove: fn(RowIndex, &mut ErasedPageTable),
    clone: fn(&ErasedPageTable) -> ErasedPageTable,
    clone_empty: fn() -> ErasedPageTable,
    /// src, dst, src row, dst row
    ///
    /// If the component is missing from `src` this is a noop.
    move_row: fn(&mut ErasedPageTable, &mut ErasedPageTable, RowIndex, RowIndex),
    /// Move a value between two rows of the same table.
    move_slot: fn(&mut ErasedPageTable, RowIndex, RowIndex),
}

// The inner pointer uniquely owns a boxed PageTable; cross-thread access is
// gated by the stage executor, which never aliases a mutated column.
unsafe impl Send for ErasedPageTable {}
unsafe impl Sync for ErasedPageTable {}

impl Drop for ErasedPageTable {
    fn drop(&mut self) {
        (self.finalize)(self);
    }
}

impl Clone for ErasedPageTable {
    fn clone(&self) -> Self {
        (self.clone)(self)
    }
}

impl std::fmt::Debug for ErasedPageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedPageTable")
            .field("ty", &self.ty_name)
            .finish()
    }
}

impl ErasedPageTable {
    pub fn new<T: Component>(table: PageTable<T>) -> Self {
        Self {
            ty_name: std::any::type_name::<T>(),
            inner: Box::into_raw(Box::new(table)).cast(),
            finalize: |erased: &mut ErasedPageTable| {
                // drop the inner table
                unsafe {
                    let _ = Box::from_raw(erased.inner.cast::<PageTable<T>>());
                }
            },
            remove: |row, erased: &mut ErasedPageTable| unsafe {
                erased.as_inner_mut::<T>().remove(row);
            },
            clone: |erased: &ErasedPageTable| {
                let inner = unsafe { erased.as_inner::<T>() };
                ErasedPageTable::new(inner.clone())
            },
            clone_empty: || ErasedPageTable::new::<T>(PageTable::default()),
            move_row: |src, dst, src_row, dst_row| unsafe {
                let src = src.as_inner_mut::<T>();
                let dst = dst.as_inner_mut::<T>();
                if let Some(val) = src.remove(src_row) {
                    dst.insert(dst_row, val);
                }
            },
            move_slot: |erased, from, to| unsafe {
                let inner = erased.as_inner_mut::<T>();
                if let Some(val) = inner.remove(from) {
                    inner.insert(to, val);
                }
            },
        }
    }

    /// # Safety
    /// Must be called with the same type as `new`.
    pub unsafe fn as_inner<T>(&self) -> &PageTable<T> {
        unsafe { &*self.inner.cast() }
    }

    /// # Safety
    /// Must be called with the same type as `new`.
    pub unsafe fn as_inner_mut<T>(&mut self) -> &mut PageTable<T> {
        unsafe { &mut *self.inner.cast() }
    }

    /// # Safety
    /// Must be called with the same type as `new`. The caller is responsible
    /// for not aliasing mutable access through the returned pointer.
    pub unsafe fn as_inner_ptr<T>(&self) -> *mut PageTable<T> {
        self.inner.cast()
    }

    pub fn remove(&mut self, row: RowIndex) {
        (self.remove)(row, self);
    }

    pub fn move_slot(&mut self, from: RowIndex, to: RowIndex) {
        (self.move_slot)(self, from, to);
    }
}
