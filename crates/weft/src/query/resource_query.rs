//! Resource access from inside systems.

use std::{any::TypeId, collections::HashSet, marker::PhantomData, ptr::NonNull};

use crate::{World, query::WorldQuery};

/// Shared access to the resource `T`.
///
/// Panics at system start when the resource has not been inserted.
pub struct Res<'a, T> {
    inner: &'a T,
}

impl<'a, T: 'static> WorldQuery<'a> for Res<'a, T> {
    fn new(world: &'a World, _system_idx: usize) -> Self {
        let inner = world.get_resource::<T>().unwrap_or_else(|| {
            panic!(
                "resource {} requested by a system was never inserted",
                std::any::type_name::<T>()
            )
        });
        Self { inner }
    }

    fn resources_const(set: &mut HashSet<TypeId>) {
        set.insert(TypeId::of::<T>());
    }
}

impl<T> std::ops::Deref for Res<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Res<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

/// Exclusive access to the resource `T`.
///
/// Panics at system start when the resource has not been inserted.
pub struct ResMut<'a, T> {
    inner: NonNull<T>,
    _m: PhantomData<&'a mut T>,
}

impl<'a, T: 'static> WorldQuery<'a> for ResMut<'a, T> {
    fn new(world: &'a World, _system_idx: usize) -> Self {
        let inner = world.resource_ptr::<T>().unwrap_or_else(|| {
            panic!(
                "resource {} requested by a system was never inserted",
                std::any::type_name::<T>()
            )
        });
        Self {
            inner,
            _m: PhantomData,
        }
    }

    fn resources_mut(set: &mut HashSet<TypeId>) {
        set.insert(TypeId::of::<T>());
    }
}

impl<T> std::ops::Deref for ResMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Exclusivity is enforced by the stage scheduler.
        unsafe { self.inner.as_ref() }
    }
}

impl<T> std::ops::DerefMut for ResMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.inner.as_mut() }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ResMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Tick(u64);

    #[test]
    fn test_res_reads_resource() {
        let mut world = World::new();
        world.insert_resource(Tick(7));

        fn check(tick: Res<Tick>) {
            assert_eq!(tick.0, 7);
        }
        world.run_system(check);
    }

    #[test]
    fn test_res_mut_writes_resource() {
        let mut world = World::new();
        world.insert_resource(Tick(0));

        fn bump(mut tick: ResMut<Tick>) {
            tick.0 += 1;
        }
        let stage = SystemStage::new("tick").with_system(bump);
        world.run_stage(&stage);
        world.run_stage(&stage);

        assert_eq!(world.get_resource::<Tick>(), Some(&Tick(2)));
    }

    #[test]
    #[should_panic(expected = "was never inserted")]
    fn test_missing_resource_panics() {
        let mut world = World::new();
        fn sys(_tick: Res<Tick>) {}
        world.run_system(sys);
    }
}
