//! persistor-core: schema-driven object-graph persistence.
//!
//! Declare persistable types in a `catalog::SchemaCatalog`, register
//! converters in an `adaptor::AdaptorRegistry`, and hand both to an
//! `engine::PersistEngine` together with a document store. The engine
//! saves the live graph of registered instances and loads it back through
//! a host (`host::SceneHost`) that owns the instances themselves.

pub mod adaptor;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod host;
pub mod instance;
pub mod registry;
pub mod rng;
#[cfg(feature = "sample")]
pub mod sample;
pub mod scene;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod types;
