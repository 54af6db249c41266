//! Bundles: inserting several components with one call.

use crate::{Component, World, entity_id::EntityId, error::Result};

/// A group of components stored onto an entity in one call.
///
/// Implemented for tuples of up to 8 components; a single component is the
/// one-element tuple `(value,)`.
pub trait Bundle: 'static {
    fn store(self, world: &mut World, id: EntityId) -> Result<()>;
}

macro_rules! impl_bundle_tuple {
    ($($idx: tt : $t: ident),+ $(,)?) => {
        impl<$($t: Component),+> Bundle for ($($t,)+) {
            fn store(self, world: &mut World, id: EntityId) -> Result<()> {
                $(world.set_component(id, self.$idx)?;)+
                Ok(())
            }
        }
    };
}

impl_bundle_tuple!(0: T0);
impl_bundle_tuple!(0: T0, 1: T1);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2, 3: T3);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_bundle_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
