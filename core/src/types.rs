//! Shared primitive types used across the persistence core.

/// A stable, globally unique identifier for one live instance.
/// Formed as `<prefix>_<token>`.
pub type Identity = String;

/// The concrete name of a persistable type, as written into type sections.
pub type TypeName = String;

/// Host-side handle for one node in the scene hierarchy.
/// Allocated by the instantiation host, never persisted.
pub type NodeId = u64;

/// The format version written into every save document.
pub const DOCUMENT_VERSION: u32 = 1;
