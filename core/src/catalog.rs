//! Schema catalog: the explicit table of persistable types.
//!
//! Types are declared once (descriptor + factory), then `generate()`
//! validates and generates every declared type. A type that fails
//! validation is reported and left without a schema; the rest still
//! generate.

use crate::{
    adaptor::AdaptorRegistry,
    config::PersistConfig,
    descriptor::TypeDescriptor,
    error::SchemaError,
    instance::{default_factory, InstanceFactory, PersistableType},
    schema::{self, render::RenderedFile, GeneratedSchema},
};
use std::collections::{BTreeMap, BTreeSet};

struct TypeEntry {
    descriptor: TypeDescriptor,
    factory:    Option<InstanceFactory>,
}

/// Outcome of one generation run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerationReport {
    pub generated: Vec<String>,
    pub ignored:   Vec<String>,
    pub failed:    Vec<(String, SchemaError)>,
}

impl GenerationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct SchemaCatalog {
    entries: BTreeMap<String, TypeEntry>,
    schemas: BTreeMap<String, GeneratedSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a Rust persistable type. Its factory is its `Default`.
    pub fn declare<T: PersistableType>(&mut self) -> &mut Self {
        let descriptor = T::descriptor();
        debug_assert_eq!(descriptor.name, T::TYPE_NAME, "descriptor name must match TYPE_NAME");
        self.declare_with(descriptor, Some(default_factory::<T>()))
    }

    /// Declare a type from a bare descriptor, optionally with a factory.
    /// Without one, loading needs a host template for the type.
    pub fn declare_with(&mut self, descriptor: TypeDescriptor, factory: Option<InstanceFactory>) -> &mut Self {
        if self.entries.contains_key(&descriptor.name) {
            log::warn!("Type '{}' declared twice; keeping the latest", descriptor.name);
        }
        self.entries.insert(descriptor.name.clone(), TypeEntry { descriptor, factory });
        self
    }

    /// Generate schemas for every declared, non-ignored type. Replaces any
    /// previously generated schemas.
    pub fn generate(&mut self, adaptors: &AdaptorRegistry) -> GenerationReport {
        let persistable: BTreeSet<String> = self
            .entries
            .values()
            .filter(|e| !e.descriptor.ignored)
            .map(|e| e.descriptor.name.clone())
            .collect();

        let mut report = GenerationReport::default();
        self.schemas.clear();
        for (name, entry) in &self.entries {
            if entry.descriptor.ignored {
                report.ignored.push(name.clone());
                continue;
            }
            match schema::generate(&entry.descriptor, &persistable, adaptors) {
                Ok(generated) => {
                    self.schemas.insert(name.clone(), generated);
                    report.generated.push(name.clone());
                }
                Err(err) => {
                    log::warn!("Schema generation failed for '{name}': {err}");
                    report.failed.push((name.clone(), err));
                }
            }
        }
        log::info!(
            "Generated {} schema(s), {} ignored, {} failed",
            report.generated.len(),
            report.ignored.len(),
            report.failed.len()
        );
        report
    }

    pub fn schema(&self, type_name: &str) -> Option<&GeneratedSchema> {
        self.schemas.get(type_name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &GeneratedSchema> {
        self.schemas.values()
    }

    pub fn descriptor(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.entries.get(type_name).map(|e| &e.descriptor)
    }

    pub fn factory(&self, type_name: &str) -> Option<InstanceFactory> {
        self.entries.get(type_name).and_then(|e| e.factory.clone())
    }

    /// Identity prefix per declared type.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|e| (e.descriptor.name.as_str(), e.descriptor.prefix()))
    }

    /// Every type each declared type extends.
    pub fn lineages(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .values()
            .filter(|e| !e.descriptor.bases.is_empty())
            .map(|e| (e.descriptor.name.as_str(), e.descriptor.bases.as_slice()))
    }

    /// Render source for every generated schema, in type-name order.
    pub fn render_all(&self, config: &PersistConfig, adaptors: &AdaptorRegistry) -> Vec<RenderedFile> {
        self.schemas
            .values()
            .flat_map(|s| schema::render::render(s, config, adaptors))
            .collect()
    }
}
