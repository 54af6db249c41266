//! The most common imports, ready for a glob.

pub use crate::bundle::Bundle;
pub use crate::commands::{Commands, EntityCommands};
pub use crate::entity_id::EntityId;
pub use crate::error::{Error, Result};
pub use crate::query::filters::{Filter, With, WithOut};
pub use crate::query::resource_query::{Res, ResMut};
pub use crate::query::{Query, WorldQuery};
pub use crate::query_set::QuerySet;
#[cfg(feature = "serde")]
pub use crate::snapshot::{Snapshot, SnapshotRegistry};
pub use crate::systems::{IntoSystem, SystemStage};
pub use crate::{Component, World};
