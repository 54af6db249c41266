//! An archetype-based entity-component-system.
//!
//! Entities are lightweight generational ids. Components are plain Rust
//! values grouped by archetype: all entities sharing the same set of
//! component types live in one [`archetype::ArchetypeStorage`], which keeps
//! one densely packed column per component type. Systems are plain functions
//! over [`query::Query`] parameters, grouped into a [`systems::SystemStage`]
//! and executed by [`World::run_stage`].
//!
//! ```
//! use weft::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! struct Health(i32);
//!
//! fn heal(q: Query<&mut Health>) {
//!     for hp in q.iter() {
//!         hp.0 += 1;
//!     }
//! }
//!
//! let mut world = World::new();
//! let id = world.insert_entity();
//! world.set_component(id, Health(10)).unwrap();
//!
//! let stage = SystemStage::new("update").with_system(heal);
//! world.run_stage(&stage);
//!
//! assert_eq!(world.get_component::<Health>(id).unwrap().0, 11);
//! ```
//!
//! With the `parallel` feature enabled, [`World::run_stage`] runs systems
//! with disjoint component/resource access sets on separate threads. The
//! `serde` feature adds world snapshots ([`snapshot`]).

pub mod archetype;
pub mod bundle;
pub mod commands;
pub mod entity_id;
mod entity_index;
pub mod error;
pub mod page_table;
pub mod prelude;
pub mod query;
pub mod query_set;
#[cfg(feature = "parallel")]
mod schedule;
#[cfg(feature = "serde")]
pub mod snapshot;
pub mod systems;
mod world;

pub use error::{Error, Result};
pub use world::World;

/// Index of an entity's row inside an archetype.
pub type RowIndex = u32;

/// Identity of an archetype: the XOR of its component types' hashes.
pub type TypeHash = u64;

/// Marker for types that can be stored as components.
///
/// Blanket-implemented: any `'static + Clone` type is a component.
pub trait Component: 'static + Clone {}
impl<T: 'static + Clone> Component for T {}

pub(crate) fn hash_ty<T: 'static>() -> TypeHash {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::any::TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ty_is_stable_per_type() {
        assert_eq!(hash_ty::<u32>(), hash_ty::<u32>());
        assert_ne!(hash_ty::<u32>(), hash_ty::<u64>());
        assert_ne!(hash_ty::<u32>(), hash_ty::<()>());
    }
}
