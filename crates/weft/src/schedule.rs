//! Conflict-aware batching of a stage's systems.

use std::{any::TypeId, collections::HashSet};

use crate::systems::ErasedSystem;

struct Access {
    components_mut: HashSet<TypeId>,
    components_const: HashSet<TypeId>,
    resources_mut: HashSet<TypeId>,
    resources_const: HashSet<TypeId>,
}

impl Access {
    fn of_system<R>(system: &ErasedSystem<'_, R>) -> Self {
        Self {
            components_mut: (system.components_mut)(),
            components_const: (system.components_const)(),
            resources_mut: (system.resources_mut)(),
            resources_const: (system.resources_const)(),
        }
    }

    /// Two systems conflict when one writes what the other reads or writes.
    fn conflicts(&self, other: &Self) -> bool {
        overlaps(&self.components_mut, &other.components_mut)
            || overlaps(&self.components_mut, &other.components_const)
            || overlaps(&other.components_mut, &self.components_const)
            || overlaps(&self.resources_mut, &other.resources_mut)
            || overlaps(&self.resources_mut, &other.resources_const)
            || overlaps(&other.resources_mut, &self.resources_const)
    }
}

fn overlaps(a: &HashSet<TypeId>, b: &HashSet<TypeId>) -> bool {
    a.iter().any(|ty| b.contains(ty))
}

/// Greedy partition of a stage into batches of mutually non-conflicting
/// systems.
///
/// Walks systems in stage order and closes the current batch whenever the
/// next system conflicts with a member, so batching never reorders across a
/// conflict and batches preserve stage order.
pub(crate) struct Schedule {
    pub(crate) batches: Vec<Vec<usize>>,
}

impl Schedule {
    pub(crate) fn of_systems<R>(systems: &[ErasedSystem<'_, R>]) -> Self {
        let accesses: Vec<Access> = systems.iter().map(Access::of_system).collect();
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for (i, access) in accesses.iter().enumerate() {
            if current.iter().any(|&j| access.conflicts(&accesses[j])) {
                batches.push(std::mem::take(&mut current));
            }
            current.push(i);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Self { batches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use crate::systems::IntoSystem;

    #[derive(Clone, Debug)]
    struct A(i32);

    #[derive(Clone, Debug)]
    struct B(i32);

    fn read_a(_q: Query<&A>) {}
    fn also_read_a(_q: Query<&A>) {}
    fn write_a(_q: Query<&mut A>) {}
    fn write_b(_q: Query<&mut B>) {}

    #[test]
    fn test_readers_share_a_batch() {
        let systems = vec![read_a.system(), also_read_a.system()];
        let schedule = Schedule::of_systems(&systems);
        assert_eq!(schedule.batches, vec![vec![0, 1]]);
    }

    #[test]
    fn test_writer_splits_readers() {
        let systems = vec![read_a.system(), write_a.system(), also_read_a.system()];
        let schedule = Schedule::of_systems(&systems);
        assert_eq!(schedule.batches, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_disjoint_writers_share_a_batch() {
        let systems = vec![write_a.system(), write_b.system()];
        let schedule = Schedule::of_systems(&systems);
        assert_eq!(schedule.batches, vec![vec![0, 1]]);
    }

    #[test]
    fn test_resource_writes_conflict() {
        fn bump(_t: ResMut<u64>) {}
        fn read(_t: Res<u64>) {}
        let systems = vec![bump.system(), read.system()];
        let schedule = Schedule::of_systems(&systems);
        assert_eq!(schedule.batches.len(), 2);
    }

    #[test]
    fn test_parallel_stage_runs_all_systems() {
        let mut world = World::new();
        for i in 0..32 {
            world.insert((A(i), B(i))).unwrap();
        }

        fn bump_a(q: Query<&mut A>) {
            for a in q.iter() {
                a.0 += 1;
            }
        }
        fn bump_b(q: Query<&mut B>) {
            for b in q.iter() {
                b.0 += 1;
            }
        }

        let stage = SystemStage::new("update")
            .with_system(bump_a)
            .with_system(bump_b);
        world.run_stage(&stage);

        let q = Query::<(&A, &B)>::new(&world);
        assert_eq!(q.count(), 32);
        for (a, b) in q.iter() {
            assert_eq!(a.0, b.0);
        }
    }
}
