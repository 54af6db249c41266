//! World snapshots: persistence for a registered set of component types.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    Component, World,
    entity_id::EntityId,
    error::{Error, Result},
};

/// A serializable capture of a world's live entities and the components of
/// every registered type.
///
/// Component values are stored as JSON values keyed by the name they were
/// registered under, so a snapshot survives renaming the Rust types.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    entities: Vec<EntityId>,
    components: BTreeMap<String, Vec<(EntityId, serde_json::Value)>>,
}

impl Snapshot {
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }
}

type SaveFn = Box<dyn Fn(&World) -> Result<Vec<(EntityId, serde_json::Value)>>>;
type LoadFn = Box<dyn Fn(&mut World, EntityId, &serde_json::Value) -> Result<()>>;

struct Entry {
    name: String,
    save: SaveFn,
    load: LoadFn,
}

/// Declares which component types participate in snapshots.
///
/// Loading rebuilds entities with fresh ids; component fields holding
/// [`EntityId`]s are serialized as-is and are *not* rewritten to the new
/// ids.
#[derive(Default)]
pub struct SnapshotRegistry {
    entries: Vec<Entry>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`.
    pub fn register<T>(mut self, name: &str) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        self.entries.push(Entry {
            name: name.to_string(),
            save: Box::new(|world| {
                let mut rows = Vec::new();
                for archetype in world.archetypes_iter() {
                    let Some(col) = archetype.column::<T>() else {
                        continue;
                    };
                    for ((_, id), (_, value)) in archetype.entities().iter().zip(col.iter()) {
                        rows.push((*id, serde_json::to_value(value)?));
                    }
                }
                Ok(rows)
            }),
            load: Box::new(|world, id, value| {
                let value: T = serde_json::from_value(value.clone())?;
                world.set_component(id, value)
            }),
        });
        self
    }

    /// Capture every live entity plus the registered components.
    pub fn save(&self, world: &World) -> Result<Snapshot> {
        let mut components = BTreeMap::new();
        for entry in &self.entries {
            components.insert(entry.name.clone(), (entry.save)(world)?);
        }
        Ok(Snapshot {
            entities: world.entity_ids(),
            components,
        })
    }

    /// Rebuild a world from a snapshot.
    ///
    /// Every snapshot entity is spawned fresh; components of registered
    /// types are restored onto them. A component name with no registration
    /// is an error, a registered type absent from the snapshot is fine.
    pub fn load(&self, snapshot: &Snapshot) -> Result<World> {
        let mut world = World::new();
        let ids: HashMap<EntityId, EntityId> = snapshot
            .entities
            .iter()
            .map(|old| (*old, world.insert_entity()))
            .collect();
        for (name, rows) in &snapshot.components {
            let entry = self
                .entries
                .iter()
                .find(|entry| entry.name == *name)
                .ok_or_else(|| Error::UnknownSnapshotComponent(name.clone()))?;
            for (old, value) in rows {
                let id = ids
                    .get(old)
                    .copied()
                    .ok_or(Error::DanglingSnapshotEntity(*old))?;
                (entry.load)(&mut world, id, value)?;
            }
        }
        debug!(
            entities = snapshot.entities.len(),
            components = snapshot.components.len(),
            "loaded world snapshot"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: i32,
        y: i32,
    }

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Name(String);

    #[derive(Clone, Debug, PartialEq)]
    struct Transient;

    fn registry() -> SnapshotRegistry {
        SnapshotRegistry::new()
            .register::<Pos>("pos")
            .register::<Name>("name")
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut world = World::new();
        world
            .insert((Pos { x: 1, y: 2 }, Name("a".into())))
            .unwrap();
        world.insert((Pos { x: 3, y: 4 }, Transient)).unwrap();
        world.insert_entity();

        let registry = registry();
        let snapshot = registry.save(&world).unwrap();
        assert_eq!(snapshot.num_entities(), 3);

        let restored = registry.load(&snapshot).unwrap();
        assert_eq!(restored.len(), 3);

        let q = Query::<(&Pos, &Name)>::new(&restored);
        let (pos, name) = q.single().unwrap();
        assert_eq!(pos, &Pos { x: 1, y: 2 });
        assert_eq!(name, &Name("a".into()));

        // the unregistered component is gone
        let mut positions: Vec<i32> =
            Query::<&Pos>::new(&restored).iter().map(|p| p.x).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 3]);
    }

    #[test]
    fn test_snapshot_survives_json() {
        let mut world = World::new();
        world.insert((Pos { x: 9, y: 9 },)).unwrap();

        let registry = registry();
        let snapshot = registry.save(&world).unwrap();
        let text = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&text).unwrap();

        let restored = registry.load(&parsed).unwrap();
        assert_eq!(
            Query::<&Pos>::new(&restored).single(),
            Some(&Pos { x: 9, y: 9 })
        );
    }

    #[test]
    fn test_unknown_component_is_an_error() {
        let mut world = World::new();
        world.insert((Pos { x: 0, y: 0 },)).unwrap();
        let snapshot = SnapshotRegistry::new()
            .register::<Pos>("pos")
            .save(&world)
            .unwrap();

        let err = SnapshotRegistry::new().load(&snapshot).unwrap_err();
        assert!(matches!(err, Error::UnknownSnapshotComponent(_)));
    }

    #[test]
    fn test_registered_but_absent_type_is_fine() {
        let world = World::new();
        let registry = registry();
        let snapshot = registry.save(&world).unwrap();
        let restored = registry.load(&snapshot).unwrap();
        assert!(restored.is_empty());
    }
}
