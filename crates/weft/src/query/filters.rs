//! Archetype-level filters for queries.

use std::marker::PhantomData;

use crate::{Component, archetype::ArchetypeStorage};

/// Restricts a query to archetypes passing a predicate, without touching the
/// filtered component's data.
pub trait Filter {
    fn filter(archetype: &ArchetypeStorage) -> bool;
}

impl Filter for () {
    fn filter(_archetype: &ArchetypeStorage) -> bool {
        true
    }
}

/// Accepts archetypes that have a `T` column.
pub struct With<T> {
    _m: PhantomData<T>,
}

impl<T: Component> Filter for With<T> {
    fn filter(archetype: &ArchetypeStorage) -> bool {
        archetype.contains_column::<T>()
    }
}

/// Accepts archetypes that do not have a `T` column.
pub struct WithOut<T> {
    _m: PhantomData<T>,
}

impl<T: Component> Filter for WithOut<T> {
    fn filter(archetype: &ArchetypeStorage) -> bool {
        !archetype.contains_column::<T>()
    }
}

macro_rules! impl_filter_tuple {
    ($($t: ident),+ $(,)?) => {
        impl<$($t: Filter),+> Filter for ($($t,)+) {
            fn filter(archetype: &ArchetypeStorage) -> bool {
                $(<$t as Filter>::filter(archetype))&&+
            }
        }
    };
}

impl_filter_tuple!(F0, F1);
impl_filter_tuple!(F0, F1, F2);
impl_filter_tuple!(F0, F1, F2, F3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeStorage;

    #[derive(Clone)]
    struct A;

    #[derive(Clone)]
    struct B;

    #[test]
    fn test_with_without() {
        let arch = ArchetypeStorage::empty().extend_with_column::<A>();
        assert!(With::<A>::filter(&arch));
        assert!(!With::<B>::filter(&arch));
        assert!(WithOut::<B>::filter(&arch));
        assert!(!WithOut::<A>::filter(&arch));
        assert!(<()>::filter(&arch));
    }

    #[test]
    fn test_tuple_filters_are_conjunctions() {
        let arch = ArchetypeStorage::empty()
            .extend_with_column::<A>()
            .extend_with_column::<B>();
        assert!(<(With<A>, With<B>)>::filter(&arch));
        assert!(!<(With<A>, WithOut<B>)>::filter(&arch));
    }
}
