//! Typed access to components from inside systems.

pub mod filters;
pub mod resource_query;

use std::{any::TypeId, collections::HashSet, marker::PhantomData, ptr::NonNull};

use crate::{
    Component, RowIndex, World, archetype::ArchetypeStorage, entity_id::EntityId,
    query::filters::Filter,
};

/// Anything a system can take as a parameter: queries, query sets, resource
/// queries, `Commands`.
///
/// The access-set methods feed the stage scheduler; a parameter that touches
/// a component or resource must report it, or parallel execution is unsound.
pub trait WorldQuery<'a>: Sized {
    fn new(world: &'a World, system_idx: usize) -> Self;

    fn components_mut(_set: &mut HashSet<TypeId>) {}
    fn components_const(_set: &mut HashSet<TypeId>) {}
    fn resources_mut(_set: &mut HashSet<TypeId>) {}
    fn resources_const(_set: &mut HashSet<TypeId>) {}
}

/// Adapter implementing [`QueryFragment`] for a given item shape.
pub struct ArchQuery<T> {
    _m: PhantomData<T>,
}

/// Per-archetype part of a query: how to iterate one archetype and whether
/// the archetype participates at all.
pub trait QueryFragment<'a> {
    type Item;
    type It: Iterator<Item = Self::Item> + 'a;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It;
    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item>;
    fn contains(archetype: &ArchetypeStorage) -> bool;
    fn types_mut(set: &mut HashSet<TypeId>);
    fn types_const(set: &mut HashSet<TypeId>);
}

fn insert_mut<T: 'static>(set: &mut HashSet<TypeId>) {
    if !set.insert(TypeId::of::<T>()) {
        panic!(
            "component {} is queried mutably more than once in the same system; \
             wrap the overlapping queries in a QuerySet",
            std::any::type_name::<T>()
        );
    }
}

impl<'a, T: Component> QueryFragment<'a> for ArchQuery<&'a T> {
    type Item = &'a T;
    type It = Box<dyn Iterator<Item = &'a T> + 'a>;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
        match archetype.column::<T>() {
            Some(col) => Box::new(col.iter().map(|(_, v)| v)),
            None => Box::new(std::iter::empty()),
        }
    }

    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
        archetype.get_component(row)
    }

    fn contains(archetype: &ArchetypeStorage) -> bool {
        archetype.contains_column::<T>()
    }

    fn types_mut(_set: &mut HashSet<TypeId>) {}

    fn types_const(set: &mut HashSet<TypeId>) {
        set.insert(TypeId::of::<T>());
    }
}

impl<'a, T: Component> QueryFragment<'a> for ArchQuery<&'a mut T> {
    type Item = &'a mut T;
    type It = Box<dyn Iterator<Item = &'a mut T> + 'a>;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
        match archetype.column_ptr::<T>() {
            // The scheduler never aliases a mutably queried column.
            Some(ptr) => Box::new(unsafe { (*ptr).iter_mut() }.map(|(_, v)| v)),
            None => Box::new(std::iter::empty()),
        }
    }

    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
        let ptr = archetype.column_ptr::<T>()?;
        unsafe { (*ptr).get_mut(row) }
    }

    fn contains(archetype: &ArchetypeStorage) -> bool {
        archetype.contains_column::<T>()
    }

    fn types_mut(set: &mut HashSet<TypeId>) {
        insert_mut::<T>(set);
    }

    fn types_const(_set: &mut HashSet<TypeId>) {}
}

impl<'a> QueryFragment<'a> for ArchQuery<EntityId> {
    type Item = EntityId;
    type It = Box<dyn Iterator<Item = EntityId> + 'a>;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
        Box::new(archetype.entities().iter().map(|(_, id)| *id))
    }

    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
        archetype.entity_at(row)
    }

    fn contains(_archetype: &ArchetypeStorage) -> bool {
        true
    }

    fn types_mut(_set: &mut HashSet<TypeId>) {}
    fn types_const(_set: &mut HashSet<TypeId>) {}
}

impl<'a, T: Component> QueryFragment<'a> for ArchQuery<Option<&'a T>> {
    type Item = Option<&'a T>;
    type It = Box<dyn Iterator<Item = Option<&'a T>> + 'a>;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
        match archetype.column::<T>() {
            Some(col) => Box::new(col.iter().map(|(_, v)| Some(v))),
            None => Box::new(std::iter::repeat_with(|| None).take(archetype.len())),
        }
    }

    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
        Some(archetype.get_component(row))
    }

    fn contains(_archetype: &ArchetypeStorage) -> bool {
        true
    }

    fn types_mut(_set: &mut HashSet<TypeId>) {}

    fn types_const(set: &mut HashSet<TypeId>) {
        set.insert(TypeId::of::<T>());
    }
}

impl<'a, T: Component> QueryFragment<'a> for ArchQuery<Option<&'a mut T>> {
    type Item = Option<&'a mut T>;
    type It = Box<dyn Iterator<Item = Option<&'a mut T>> + 'a>;

    fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
        match archetype.column_ptr::<T>() {
            Some(ptr) => Box::new(unsafe { (*ptr).iter_mut() }.map(|(_, v)| Some(v))),
            None => Box::new(std::iter::repeat_with(|| None).take(archetype.len())),
        }
    }

    fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
        let item = archetype
            .column_ptr::<T>()
            .and_then(|ptr| unsafe { (*ptr).get_mut(row) });
        Some(item)
    }

    fn contains(_archetype: &ArchetypeStorage) -> bool {
        true
    }

    fn types_mut(set: &mut HashSet<TypeId>) {
        insert_mut::<T>(set);
    }

    fn types_const(_set: &mut HashSet<TypeId>) {}
}

macro_rules! impl_fragment_tuple {
    ($(($idx: tt, $t: ident)),+ $(,)?) => {
        impl<'a, $($t),+> QueryFragment<'a> for ArchQuery<($($t,)+)>
        where
            $(ArchQuery<$t>: QueryFragment<'a>,)+
            $(<ArchQuery<$t> as QueryFragment<'a>>::Item: 'a,)+
        {
            type Item = ($(<ArchQuery<$t> as QueryFragment<'a>>::Item,)+);
            type It = Box<dyn Iterator<Item = Self::Item> + 'a>;

            fn iter(archetype: &'a ArchetypeStorage) -> Self::It {
                // All columns of one archetype iterate rows in the same
                // order, so zipping them lines items up by entity.
                let mut its = ($(<ArchQuery<$t> as QueryFragment<'a>>::iter(archetype),)+);
                Box::new(std::iter::from_fn(move || {
                    Some(($(its.$idx.next()?,)+))
                }))
            }

            fn fetch(archetype: &'a ArchetypeStorage, row: RowIndex) -> Option<Self::Item> {
                Some(($(<ArchQuery<$t> as QueryFragment<'a>>::fetch(archetype, row)?,)+))
            }

            fn contains(archetype: &ArchetypeStorage) -> bool {
                $(<ArchQuery<$t> as QueryFragment<'a>>::contains(archetype))&&+
            }

            fn types_mut(set: &mut HashSet<TypeId>) {
                $(<ArchQuery<$t> as QueryFragment<'a>>::types_mut(set);)+
            }

            fn types_const(set: &mut HashSet<TypeId>) {
                $(<ArchQuery<$t> as QueryFragment<'a>>::types_const(set);)+
            }
        }
    };
}

impl_fragment_tuple!((0, T0), (1, T1));
impl_fragment_tuple!((0, T0), (1, T1), (2, T2));
impl_fragment_tuple!((0, T0), (1, T1), (2, T2), (3, T3));
impl_fragment_tuple!((0, T0), (1, T1), (2, T2), (3, T3), (4, T4));
impl_fragment_tuple!((0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5));

/// A system parameter iterating every entity whose archetype matches both
/// the fragment `T` and the filter `F`.
///
/// `T` is an item shape: `&C`, `&mut C`, `EntityId`, `Option<&C>`,
/// `Option<&mut C>`, or a tuple of those.
pub struct Query<T, F = ()> {
    world: NonNull<World>,
    _m: PhantomData<(T, F)>,
}

impl<'a, T, F> WorldQuery<'a> for Query<T, F>
where
    ArchQuery<T>: QueryFragment<'a>,
    F: Filter,
{
    fn new(world: &'a World, _system_idx: usize) -> Self {
        Self::new(world)
    }

    fn components_mut(set: &mut HashSet<TypeId>) {
        <ArchQuery<T> as QueryFragment<'a>>::types_mut(set);
    }

    fn components_const(set: &mut HashSet<TypeId>) {
        <ArchQuery<T> as QueryFragment<'a>>::types_const(set);
    }
}

impl<'a, T, F> Query<T, F>
where
    ArchQuery<T>: QueryFragment<'a>,
    F: Filter,
{
    pub fn new(world: &'a World) -> Self {
        Self {
            world: NonNull::from(world),
            _m: PhantomData,
        }
    }

    fn world(&self) -> &'a World {
        // The query cannot outlive 'a, which run_stage bounds to the stage
        // execution.
        unsafe { &*self.world.as_ptr() }
    }

    fn archetypes(&self) -> impl Iterator<Item = &'a ArchetypeStorage> {
        self.world()
            .archetypes_iter()
            .filter(|archetype| <ArchQuery<T> as QueryFragment<'a>>::contains(archetype))
            .filter(|archetype| F::filter(archetype))
    }

    /// Iterate all matching entities, archetype by archetype.
    pub fn iter(&self) -> impl Iterator<Item = <ArchQuery<T> as QueryFragment<'a>>::Item> {
        self.archetypes()
            .flat_map(|archetype| <ArchQuery<T> as QueryFragment<'a>>::iter(archetype))
    }

    /// Resolve a single entity, or `None` if it is dead or filtered out.
    pub fn fetch(&self, id: EntityId) -> Option<<ArchQuery<T> as QueryFragment<'a>>::Item> {
        let world = self.world();
        let location = world.location(id)?;
        let archetype = world.archetype(location.ty)?;
        if !<ArchQuery<T> as QueryFragment<'a>>::contains(archetype) || !F::filter(archetype) {
            return None;
        }
        <ArchQuery<T> as QueryFragment<'a>>::fetch(archetype, location.row)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        let world = self.world();
        let Some(location) = world.location(id) else {
            return false;
        };
        world
            .archetype(location.ty)
            .is_some_and(|archetype| {
                <ArchQuery<T> as QueryFragment<'a>>::contains(archetype) && F::filter(archetype)
            })
    }

    /// Number of matching entities.
    pub fn count(&self) -> usize {
        self.archetypes().map(|archetype| archetype.len()).sum()
    }

    /// The unique matching item, or `None` when there are zero or several.
    pub fn single(&self) -> Option<<ArchQuery<T> as QueryFragment<'a>>::Item> {
        let mut it = self.iter();
        let first = it.next()?;
        it.next().is_none().then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pos(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Vel(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Tag;

    fn sample_world() -> (World, EntityId, EntityId, EntityId) {
        let mut world = World::new();
        let a = world.insert((Pos(1),)).unwrap();
        let b = world.insert((Pos(2), Vel(20))).unwrap();
        let c = world.insert((Pos(3), Vel(30), Tag)).unwrap();
        (world, a, b, c)
    }

    #[test]
    fn test_iter_spans_archetypes() {
        let (world, ..) = sample_world();
        let q = Query::<&Pos>::new(&world);
        let mut seen: Vec<i32> = q.iter().map(|p| p.0).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(q.count(), 3);
    }

    #[test]
    fn test_tuple_query_zips_columns() {
        let (world, _, b, c) = sample_world();
        let q = Query::<(EntityId, &Pos, &Vel)>::new(&world);
        let mut seen: Vec<(EntityId, i32, i32)> =
            q.iter().map(|(id, p, v)| (id, p.0, v.0)).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![(b, 2, 20), (c, 3, 30)]);
    }

    #[test]
    fn test_wide_tuple_query_mixes_fragments() {
        let (world, _, b, c) = sample_world();
        let q = Query::<(EntityId, &Pos, &mut Vel, Option<&Tag>)>::new(&world);
        let mut seen: Vec<(EntityId, i32, bool)> = q
            .iter()
            .map(|(id, pos, vel, tag)| {
                vel.0 += 1;
                (id, pos.0, tag.is_some())
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![(b, 2, false), (c, 3, true)]);
        assert_eq!(world.get_component::<Vel>(b), Some(&Vel(21)));
    }

    #[test]
    fn test_mut_query_writes_through() {
        let (mut world, a, b, c) = sample_world();
        {
            let q = Query::<&mut Pos>::new(&world);
            for p in q.iter() {
                p.0 *= 10;
            }
        }
        assert_eq!(world.get_component::<Pos>(a), Some(&Pos(10)));
        assert_eq!(world.get_component::<Pos>(b), Some(&Pos(20)));
        assert_eq!(world.get_component::<Pos>(c), Some(&Pos(30)));
    }

    #[test]
    fn test_filters() {
        let (world, a, b, c) = sample_world();
        let with_vel = Query::<EntityId, With<Vel>>::new(&world);
        let mut seen: Vec<EntityId> = with_vel.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![b, c]);

        let without_tag = Query::<&Pos, WithOut<Tag>>::new(&world);
        let mut seen: Vec<i32> = without_tag.iter().map(|p| p.0).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);

        let both = Query::<EntityId, (With<Vel>, WithOut<Tag>)>::new(&world);
        assert_eq!(both.iter().collect::<Vec<_>>(), vec![b]);
        assert!(!both.contains(a));
        assert!(both.contains(b));
    }

    #[test]
    fn test_optional_fragment() {
        let (world, ..) = sample_world();
        let q = Query::<(&Pos, Option<&Vel>)>::new(&world);
        let mut seen: Vec<(i32, Option<i32>)> =
            q.iter().map(|(p, v)| (p.0, v.map(|v| v.0))).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, None), (2, Some(20)), (3, Some(30))]);
    }

    #[test]
    fn test_fetch_and_single() {
        let (world, a, b, _) = sample_world();
        let q = Query::<&Pos>::new(&world);
        assert_eq!(q.fetch(a), Some(&Pos(1)));
        assert_eq!(q.fetch(b), Some(&Pos(2)));
        assert!(q.single().is_none());

        let tagged = Query::<&Pos, With<Tag>>::new(&world);
        assert_eq!(tagged.single(), Some(&Pos(3)));
        assert!(tagged.fetch(a).is_none());
    }

    #[test]
    fn test_fetch_dead_entity_is_none() {
        let (mut world, a, ..) = sample_world();
        world.delete_entity(a).unwrap();
        let q = Query::<&Pos>::new(&world);
        assert!(q.fetch(a).is_none());
        assert_eq!(q.count(), 2);
    }
}
