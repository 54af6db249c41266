//! Systems: plain functions over query parameters, type-erased into stages.

use std::{any::TypeId, collections::HashSet, rc::Rc};

use crate::{World, query::WorldQuery};

/// A named, ordered list of systems executed together by
/// [`World::run_stage`](crate::World::run_stage).
#[derive(Clone)]
pub struct SystemStage<'a> {
    pub name: String,
    pub systems: Vec<ErasedSystem<'a, ()>>,
}

impl<'a> SystemStage<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            systems: Vec::new(),
        }
    }

    pub fn with_system<S, P>(mut self, system: S) -> Self
    where
        S: IntoSystem<'a, P, ()>,
    {
        self.systems.push(system.system());
        self
    }
}

pub type InnerSystem<'a, R> = Box<dyn Fn(&'a World, usize) -> R + 'a>;

/// A type-erased system.
///
/// Carries the execute closure, a factory to rebuild it (for `Clone`), the
/// system's name, and extractors for the component/resource access sets the
/// scheduler batches by.
pub struct ErasedSystem<'a, R> {
    pub(crate) name: &'static str,
    pub(crate) execute: InnerSystem<'a, R>,
    pub(crate) components_mut: fn() -> HashSet<TypeId>,
    pub(crate) components_const: fn() -> HashSet<TypeId>,
    pub(crate) resources_mut: fn() -> HashSet<TypeId>,
    pub(crate) resources_const: fn() -> HashSet<TypeId>,
    factory: Rc<dyn Fn() -> InnerSystem<'a, R>>,
}

// The factory Rc never crosses threads: parallel execution shares systems by
// reference and only calls the execute closure.
unsafe impl<R> Send for ErasedSystem<'_, R> {}
unsafe impl<R> Sync for ErasedSystem<'_, R> {}

impl<R> std::fmt::Debug for ErasedSystem<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedSystem").field("name", &self.name).finish()
    }
}

impl<'a, R> Clone for ErasedSystem<'a, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            execute: (self.factory)(),
            components_mut: self.components_mut,
            components_const: self.components_const,
            resources_mut: self.resources_mut,
            resources_const: self.resources_const,
            factory: self.factory.clone(),
        }
    }
}

/// Conversion of a function into an [`ErasedSystem`].
///
/// Implemented for functions of up to 8 parameters where every parameter is
/// a [`WorldQuery`].
pub trait IntoSystem<'a, Param, R> {
    fn system(self) -> ErasedSystem<'a, R>;
}

macro_rules! impl_intosys_fn {
    ($($t: ident),* $(,)*) => {
        impl<'a, R, F, $($t: WorldQuery<'a> + 'static,)*>
            IntoSystem<'a, ($($t),*,), R> for F
        where
            F: Fn($($t),*) -> R + 'static + Copy,
        {
            fn system(self) -> ErasedSystem<'a, R> {
                let factory: Rc<dyn Fn() -> InnerSystem<'a, R>> =
                    Rc::new(move || {
                        Box::new(move |world: &'a World, system_idx: usize| {
                            (self)(
                                $(<$t>::new(world, system_idx),)*
                            )
                        })
                    });
                let components_mut: fn() -> HashSet<TypeId> = || {
                    let mut res = HashSet::new();
                    $(<$t>::components_mut(&mut res);)*
                    res
                };
                let components_const: fn() -> HashSet<TypeId> = || {
                    let mut res = HashSet::new();
                    $(<$t>::components_const(&mut res);)*
                    res
                };
                let name = std::any::type_name::<F>();
                // conflicting declarations panic here, not mid-stage; note
                // that components_mut itself panics on duplicate muts
                if !components_mut().is_disjoint(&components_const()) {
                    panic!(
                        "system {} queries a component both mutably and immutably; \
                         make both accesses mutable and wrap them in a QuerySet",
                        name
                    );
                }
                ErasedSystem {
                    name,
                    execute: factory(),
                    components_mut,
                    components_const,
                    resources_mut: || {
                        let mut res = HashSet::new();
                        $(<$t>::resources_mut(&mut res);)*
                        res
                    },
                    resources_const: || {
                        let mut res = HashSet::new();
                        $(<$t>::resources_const(&mut res);)*
                        res
                    },
                    factory,
                }
            }
        }
    };
}

impl_intosys_fn!(Q0);
impl_intosys_fn!(Q0, Q1);
impl_intosys_fn!(Q0, Q1, Q2);
impl_intosys_fn!(Q0, Q1, Q2, Q3);
impl_intosys_fn!(Q0, Q1, Q2, Q3, Q4);
impl_intosys_fn!(Q0, Q1, Q2, Q3, Q4, Q5);
impl_intosys_fn!(Q0, Q1, Q2, Q3, Q4, Q5, Q6);
impl_intosys_fn!(Q0, Q1, Q2, Q3, Q4, Q5, Q6, Q7);
