//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stores use the id to key rows; two entities with the same id are the same
/// row regardless of their other fields.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
