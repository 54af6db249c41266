//! Generational entity identifiers.

use crate::error::Error;

/// A handle to an entity.
///
/// Packs a 32-bit slot index and a 32-bit generation into a `u64`. The
/// generation changes every time a slot is reused, so a handle kept across
/// the deletion of its entity never resolves to the slot's new occupant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self(u64::from(generation) << 32 | u64::from(index))
    }

    /// The slot index of this handle.
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation of this handle.
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl std::fmt::Display for EntityId {
    /// Formats as `index@generation`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.index(), self.generation())
    }
}

impl std::fmt::Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityId({}@{})", self.index(), self.generation())
    }
}

impl std::str::FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, generation) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidEntityId(s.to_string()))?;
        let index = index
            .parse()
            .map_err(|_| Error::InvalidEntityId(s.to_string()))?;
        let generation = generation
            .parse()
            .map_err(|_| Error::InvalidEntityId(s.to_string()))?;
        Ok(Self::new(index, generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(EntityId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn test_display_from_str_roundtrip() {
        let id = EntityId::new(123, 4);
        assert_eq!(id.to_string(), "123@4");
        let parsed: EntityId = "123@4".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("123".parse::<EntityId>().is_err());
        assert!("a@b".parse::<EntityId>().is_err());
        assert!("1@2@3".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_generations_distinguish_reused_slots() {
        let old = EntityId::new(3, 1);
        let new = EntityId::new(3, 2);
        assert_ne!(old, new);
        assert_eq!(old.index(), new.index());
    }
}
