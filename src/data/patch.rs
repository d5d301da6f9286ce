//! Partial-update field wrapper.

use serde::{Deserialize, Deserializer};

/// A field of a partial update: either omitted or supplied.
///
/// Use with `#[serde(default)]` so an omitted field deserialises to
/// `Absent`. A supplied zero value (`0`, `""`, `[]`) is `Present`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Present(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Patch::Present(_))
    }

    /// Overwrite `target` when present.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Present(value) = self {
            *target = value;
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Present)
    }
}
