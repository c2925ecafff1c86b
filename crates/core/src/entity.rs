//! Catalog records with a stable identity.

/// A record addressed by its id rather than compared by value.
///
/// Stores key catalog records (ingredients, dishes, menus) by `id()`; two
/// records with the same id are the same record at different times.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    /// Label used in listings and error messages.
    fn name(&self) -> &str;
}
