//! Query sets: multiple queries with overlapping mutable access in one
//! system parameter.

use std::{any::TypeId, collections::HashSet, marker::PhantomData};

use crate::{
    World,
    query::{ArchQuery, Query, QueryFragment, WorldQuery, filters::Filter},
};

/// Wraps a tuple of [`Query`]s whose component sets may overlap.
///
/// A bare parameter list rejects two queries that borrow the same component
/// mutably; a `QuerySet` is one parameter, so the overlap is fine as long as
/// the caller only uses one sub-query at a time.
///
/// In a system signature, name one lifetime and use it for every component
/// reference in the set; elided lifetimes do not unify across sub-queries:
///
/// ```
/// use weft::prelude::*;
///
/// #[derive(Clone, Debug)]
/// struct Hp(i32);
///
/// fn drain<'a>(mut set: QuerySet<(Query<&'a mut Hp>, Query<&'a mut Hp, With<Hp>>)>) {
///     for hp in set.q0_mut().iter() {
///         hp.0 -= 1;
///     }
/// }
/// # let mut world = World::new();
/// # let id = world.insert_entity();
/// # world.set_component(id, Hp(3)).unwrap();
/// # world.run_system(drain);
/// # assert_eq!(Query::<&Hp>::new(&world).single().unwrap().0, 2);
/// ```
pub struct QuerySet<Inner> {
    inner: Inner,
    _m: PhantomData<Inner>,
}

macro_rules! impl_tuple {
    ($($idx: tt , $t: ident , $f: ident , $q: ident , $q_mut: ident , $set: ident);+ $(;)?) => {
        impl<'a, $($t, $f),*> QuerySet<($(Query<$t, $f>),*)>
        where
            $(
            ArchQuery<$t>: QueryFragment<'a>,
            $f: Filter,
            )*
        {
            $(
            pub fn $q(&self) -> &Query<$t, $f> {
                &self.inner.$idx
            }

            pub fn $q_mut(&mut self) -> &mut Query<$t, $f> {
                &mut self.inner.$idx
            }

            )*
        }

        impl<'a, $($t, $f),*> WorldQuery<'a> for QuerySet<($(Query<$t, $f>),*)>
        where
            $(
            ArchQuery<$t>: QueryFragment<'a>,
            $f: Filter,
            )*
        {
            fn new(world: &'a World, _system_idx: usize) -> Self {
                Self {
                    inner: ($(Query::<$t, $f>::new(world)),*),
                    _m: PhantomData,
                }
            }

            fn components_mut(set: &mut HashSet<TypeId>) {
                // Sub-queries may share types (that's the point of the set).
                // types_mut panics on duplicates, so collect each sub-query
                // in isolation, then merge.
                $(
                    let mut $set = set.clone();
                    <ArchQuery<$t> as QueryFragment<'a>>::types_mut(&mut $set);
                )*

                $(
                    set.extend($set.into_iter());
                )*
            }

            fn components_const(set: &mut HashSet<TypeId>) {
                $(
                    <ArchQuery<$t> as QueryFragment<'a>>::types_const(set);
                )*
            }
        }
    };
}

impl_tuple!(0 , T0 , F0 , q0 , q0_mut , set0; 1 , T1 , F1 , q1 , q1_mut , set1;);
impl_tuple!(0 , T0 , F0 , q0 , q0_mut , set0; 1 , T1 , F1 , q1 , q1_mut , set1; 2 , T2 , F2 , q2 , q2_mut , set2;);
impl_tuple!(0 , T0 , F0 , q0 , q0_mut , set0; 1 , T1 , F1 , q1 , q1_mut , set1; 2 , T2 , F2 , q2 , q2_mut , set2; 3 , T3 , F3 , q3 , q3_mut , set3;);
impl_tuple!(0 , T0 , F0 , q0 , q0_mut , set0; 1 , T1 , F1 , q1 , q1_mut , set1; 2 , T2 , F2 , q2 , q2_mut , set2; 3 , T3 , F3 , q3 , q3_mut , set3; 4 , T4 , F4 , q4 , q4_mut , set4;);
impl_tuple!(0 , T0 , F0 , q0 , q0_mut , set0; 1 , T1 , F1 , q1 , q1_mut , set1; 2 , T2 , F2 , q2 , q2_mut , set2; 3 , T3 , F3 , q3 , q3_mut , set3; 4 , T4 , F4 , q4 , q4_mut , set4; 5 , T5 , F5 , q5 , q5_mut , set5;);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Hp(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Regen(i32);

    #[test]
    fn test_overlapping_mut_queries_via_query_set() {
        let mut world = World::new();
        let solo = world.insert((Hp(10),)).unwrap();
        let regen = world.insert((Hp(10), Regen(5))).unwrap();

        fn heal<'a>(mut set: QuerySet<(Query<&'a mut Hp>, Query<(&'a mut Hp, &'a Regen)>)>) {
            for (hp, regen) in set.q1_mut().iter() {
                hp.0 += regen.0;
            }
            for hp in set.q0_mut().iter() {
                hp.0 += 1;
            }
        }
        world.run_system(heal);

        assert_eq!(world.get_component::<Hp>(solo), Some(&Hp(11)));
        assert_eq!(world.get_component::<Hp>(regen), Some(&Hp(16)));
    }

    #[test]
    fn test_components_mut_merges_overlaps() {
        use std::any::TypeId;

        let mut set = std::collections::HashSet::new();
        <QuerySet<(Query<&mut Hp>, Query<(&mut Hp, &Regen)>)> as WorldQuery>::components_mut(
            &mut set,
        );
        assert!(set.contains(&TypeId::of::<Hp>()));
        assert_eq!(set.len(), 1);
    }
}
