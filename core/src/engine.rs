//! The persistence engine: one explicit session context tying together the
//! schema catalog, adaptors, identity registry, document store and codec.
//!
//! SAVE:
//!   1. snapshot registered instances, deduplicated by identity
//!   2. group by concrete type, in first-seen order
//!   3. mirror each instance (plus placement for hierarchical types and
//!      node adaptor records)
//!   4. encode each record on its own, write the document
//!      an instance that fails 3 or 4 is skipped and reported
//!
//! LOAD (full replace, transactional):
//!   0. read and decode the whole document; a bad document changes nothing
//!   1. instantiate every record and force its identity (staging registry)
//!      then destroy every pre-load instance
//!   2. place hierarchical instances (anchor, parent, or root)
//!   3. copy fields; references resolve against the staged graph
//!      then node adaptors re-apply host-side state
//!   4. commit: swap the staging registry in
//!
//! RULES:
//!   - Each pass completes for every record before the next pass starts.
//!   - A record that fails any pass is skipped and reported; the rest load.
//!   - A reference to an identity absent from the document loads as an
//!     absent link and is reported. It is never an error.

use crate::{
    adaptor::{AdaptorRegistry, DynNodeAdaptor},
    catalog::{GenerationReport, SchemaCatalog},
    config::PersistConfig,
    error::{PersistError, PersistResult},
    host::{CreateRequest, HierarchyHost, SceneHost},
    instance::{Handle, PersistableType},
    registry::InstanceRegistry,
    rng::TokenSource,
    schema::{
        mirror::{DanglingReference, DataMirror, HierarchyRecord},
        preset::Preset,
        GeneratedSchema,
    },
    snapshot::{decode_record, encode_record, DocumentCodec, JsonCodec, SaveDocument, TypeSection},
    store::{DocumentStore, SaveSummary},
    types::{Identity, NodeId, TypeName, DOCUMENT_VERSION},
};
use serde::Serialize;

/// Optional inputs to `PersistEngine::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions<'a> {
    /// Host template to build from. Defaults to the type's own template.
    pub template: Option<&'a str>,
    pub preset:   Option<&'a Preset>,
    pub name:     Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub name:          String,
    pub written:       usize,
    /// Live types without a generated schema; their instances were not saved.
    pub skipped_types: Vec<TypeName>,
    /// Identities held by more than one live instance; one of each was saved.
    pub duplicates:    Vec<Identity>,
    /// Instances that could not be mirrored or encoded. The rest saved.
    pub skipped:       Vec<SkippedRecord>,
}

/// A record left out of a save or a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub type_name: TypeName,
    /// Position inside its type section. `None` when the whole section was
    /// skipped, and for instances left out of a save.
    pub index:     Option<usize>,
    pub id:        Option<Identity>,
    pub reason:    String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub name:         String,
    pub instantiated: usize,
    /// Pre-load instances torn down at commit.
    pub destroyed:    usize,
    pub skipped:      Vec<SkippedRecord>,
    pub dangling:     Vec<DanglingReference>,
    /// Hierarchical instances whose saved placement could not be applied;
    /// they were left at the root.
    pub unplaced:     Vec<Identity>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.dangling.is_empty() && self.unplaced.is_empty()
    }
}

/// A decoded record and the fresh instance built for it.
struct Pairing<'s> {
    schema: &'s GeneratedSchema,
    index:  usize,
    mirror: DataMirror,
    handle: Handle,
}

pub struct PersistEngine {
    config:     PersistConfig,
    catalog:    SchemaCatalog,
    adaptors:   AdaptorRegistry,
    registry:   InstanceRegistry,
    store:      Box<dyn DocumentStore>,
    codec:      Box<dyn DocumentCodec>,
    generation: GenerationReport,
}

impl PersistEngine {
    /// Build an engine and generate schemas for every declared type.
    /// Types that fail validation are logged and left unpersisted; check
    /// `generation_report()`.
    pub fn new(
        config: PersistConfig,
        mut catalog: SchemaCatalog,
        adaptors: AdaptorRegistry,
        store: Box<dyn DocumentStore>,
    ) -> Self {
        let generation = catalog.generate(&adaptors);

        let mut registry = InstanceRegistry::new(TokenSource::from_seed(config.id_seed));
        for (type_name, prefix) in catalog.prefixes() {
            registry.set_prefix(type_name, prefix);
        }
        for (type_name, bases) in catalog.lineages() {
            registry.set_bases(type_name, bases.to_vec());
        }

        let codec = Box::new(JsonCodec {
            pretty: config.pretty_documents,
        });
        Self {
            config,
            catalog,
            adaptors,
            registry,
            store,
            codec,
            generation,
        }
    }

    /// Sample types over an in-memory SQLite store, with identities seeded
    /// from `seed`. Used by tests.
    #[cfg(feature = "sample")]
    pub fn build_test(seed: u64) -> PersistResult<Self> {
        use crate::{sample, store::SqliteStore};
        Ok(Self::new(
            PersistConfig::seeded(seed),
            sample::catalog(),
            sample::adaptors(),
            Box::new(SqliteStore::in_memory()?),
        ))
    }

    /// Replace the document codec.
    pub fn with_codec(mut self, codec: Box<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn adaptors(&self) -> &AdaptorRegistry {
        &self.adaptors
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InstanceRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn generation_report(&self) -> &GenerationReport {
        &self.generation
    }

    /// Look up a live instance by identity that is a `T` or extends it.
    pub fn resolve<T: PersistableType>(&self, id: &str) -> Option<Handle> {
        self.registry.resolve::<T>(id)
    }

    // ── Instance lifecycle ─────────────────────────────────────

    /// Create and activate a new instance of `type_name`, optionally from a
    /// template and with a preset applied before its identity is minted.
    pub fn spawn<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        type_name: &str,
        options: SpawnOptions<'_>,
    ) -> PersistResult<Handle> {
        let schema = self.schema(type_name)?;
        let handle = self.instantiate(host, schema, options.template, options.name)?;
        if let Some(preset) = options.preset {
            let applied = {
                let mut inner = handle.borrow_mut();
                schema.copy_from_preset(preset, &mut *inner)
            };
            if let Err(err) = applied {
                host.destroy(&handle);
                return Err(err);
            }
        }
        let id = self.registry.register(&handle);
        log::debug!("Spawned {type_name} '{id}' on node {}", handle.node());
        Ok(handle)
    }

    /// Activate an instance the host created on its own.
    pub fn adopt(&mut self, handle: &Handle) -> Identity {
        self.registry.register(handle)
    }

    /// Deactivate and destroy an instance.
    pub fn despawn<H: SceneHost + ?Sized>(&mut self, host: &mut H, handle: &Handle) {
        self.registry.unregister(handle);
        host.destroy(handle);
    }

    /// Capture an instance's direct fields as a preset.
    pub fn capture_preset(&self, handle: &Handle) -> PersistResult<Preset> {
        let schema = self.schema(handle.type_name())?;
        let inner = handle.borrow();
        schema.capture_preset(&*inner)
    }

    // ── Save ───────────────────────────────────────────────────

    pub fn save<H: HierarchyHost>(&self, host: &H, name: &str) -> PersistResult<SaveReport> {
        let snapshot = self.registry.snapshot();
        let mut report = SaveReport {
            name: name.to_string(),
            duplicates: snapshot.duplicates,
            ..SaveReport::default()
        };

        let mut document = SaveDocument::new();
        for handle in &snapshot.instances {
            let type_name = handle.type_name();
            let Some(schema) = self.catalog.schema(type_name) else {
                if !report.skipped_types.iter().any(|t| t == type_name) {
                    log::warn!("No generated schema for '{type_name}'; its instances are not saved");
                    report.skipped_types.push(type_name.to_string());
                }
                continue;
            };

            let record = match self.record_for(host, schema, handle) {
                Ok(record) => record,
                Err(err) => {
                    let id = handle.identity();
                    log::warn!("Not saving {type_name} '{id}': {err}");
                    report.skipped.push(SkippedRecord {
                        type_name: type_name.to_string(),
                        index:     None,
                        id:        Some(id),
                        reason:    err.to_string(),
                    });
                    continue;
                }
            };

            match document.sections.iter_mut().find(|s| s.type_name == type_name) {
                Some(section) => section.records.push(record),
                None => document.sections.push(TypeSection {
                    type_name: type_name.to_string(),
                    records:   vec![record],
                }),
            }
            report.written += 1;
        }

        let text = self.codec.encode(&document)?;
        self.store.write(name, &text)?;
        log::info!(
            "Saved '{name}': {} record(s) in {} section(s), {} skipped",
            report.written,
            document.sections.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Mirror and encode one instance.
    fn record_for<H: HierarchyHost>(
        &self,
        host: &H,
        schema: &GeneratedSchema,
        handle: &Handle,
    ) -> PersistResult<String> {
        let mut mirror = {
            let inner = handle.borrow();
            schema.copy_to_data(&*inner, &self.adaptors)?
        };
        if schema.hierarchical {
            mirror.hierarchy = Some(self.placement_of(host, handle));
        }
        for name in &schema.node_adaptors {
            if let Some(record) = self.node_adaptor(name)?.capture(host, handle.node())? {
                mirror.node.insert(name.clone(), record);
            }
        }
        encode_record(&mirror)
    }

    fn placement_of<H: HierarchyHost + ?Sized>(&self, host: &H, handle: &Handle) -> HierarchyRecord {
        let node = handle.node();
        let mut record = HierarchyRecord {
            sibling_index: host.sibling_index(node).unwrap_or(0),
            ..HierarchyRecord::default()
        };
        let Some(parent) = host.parent_of(node) else {
            return record;
        };

        if let Some(anchor) = host.anchor_name(parent) {
            record.anchor = Some(anchor);
        } else if let Some(parent_id) = host.instance_at(parent).map(|p| p.identity()).filter(|id| !id.is_empty()) {
            record.parent = Some(parent_id);
        } else {
            log::warn!(
                "{} '{}': parent node {parent} is neither an anchor nor a persisted instance; saved as root",
                handle.type_name(),
                handle.identity()
            );
        }
        record
    }

    // ── Load ───────────────────────────────────────────────────

    pub fn load<H: SceneHost>(&mut self, host: &mut H, name: &str) -> PersistResult<LoadReport> {
        let document = self.read_document(name)?;
        let mut report = LoadReport {
            name: name.to_string(),
            ..LoadReport::default()
        };
        let mut staging = self.registry.detached();

        // Pass 1: instantiate and register every record.
        let mut pairings = Vec::with_capacity(document.record_count());
        for section in &document.sections {
            let Some(schema) = self.catalog.schema(&section.type_name) else {
                log::warn!(
                    "No generated schema for '{}'; skipping {} record(s)",
                    section.type_name,
                    section.records.len()
                );
                report.skipped.push(SkippedRecord {
                    type_name: section.type_name.clone(),
                    index:     None,
                    id:        None,
                    reason:    PersistError::MissingSchema {
                        type_name: section.type_name.clone(),
                    }
                    .to_string(),
                });
                continue;
            };

            for (index, record) in section.records.iter().enumerate() {
                match self.instantiate_record(host, schema, record, &mut staging) {
                    Ok((mirror, handle)) => pairings.push(Pairing {
                        schema,
                        index,
                        mirror,
                        handle,
                    }),
                    Err(err) => {
                        log::warn!("Skipping {} record #{index}: {err}", section.type_name);
                        report.skipped.push(SkippedRecord {
                            type_name: section.type_name.clone(),
                            index:     Some(index),
                            id:        decode_record(record).ok().map(|m| m.id),
                            reason:    err.to_string(),
                        });
                    }
                }
            }
        }
        log::debug!("Load '{name}' pass 1: {} instance(s) staged", pairings.len());

        // Pre-load instances leave the host before placement so saved
        // sibling indices count only anchors and loaded instances.
        let stale = self.registry.live();
        for handle in &stale {
            host.destroy(handle);
        }
        report.destroyed = stale.len();

        // Pass 2: placement, in ascending saved sibling order so each
        // clamped insert lands after the siblings placed before it.
        let mut placed: Vec<&Pairing<'_>> = pairings
            .iter()
            .filter(|p| p.schema.hierarchical)
            .collect();
        placed.sort_by_key(|p| p.mirror.hierarchy.as_ref().map_or(0, |h| h.sibling_index));
        for pairing in placed {
            if let Err(err) = self.place(host, pairing, &staging) {
                log::warn!("{} '{}' left at root: {err}", pairing.schema.type_name, pairing.mirror.id);
                report.unplaced.push(pairing.mirror.id.clone());
            }
        }
        log::debug!("Load '{name}' pass 2: hierarchy applied");

        // Pass 3: field copy against the fully staged graph, then host-side
        // state now that every instance sits where it belongs.
        for pairing in &pairings {
            let copied = {
                let mut inner = pairing.handle.borrow_mut();
                pairing
                    .schema
                    .copy_from_data(&pairing.mirror, &mut *inner, &staging, &self.adaptors)
            };
            let copied = match copied {
                Ok(dangling) => self.apply_node_records(host, pairing).map(|()| dangling),
                Err(err) => Err(err),
            };
            match copied {
                Ok(dangling) => {
                    for reference in &dangling {
                        log::warn!(
                            "Dangling reference {}.{} -> '{}' loads as absent",
                            reference.owner,
                            reference.field,
                            reference.target
                        );
                    }
                    report.dangling.extend(dangling);
                    report.instantiated += 1;
                }
                Err(err) => {
                    log::warn!(
                        "Skipping {} record #{} ('{}'): {err}",
                        pairing.schema.type_name,
                        pairing.index,
                        pairing.mirror.id
                    );
                    staging.unregister(&pairing.handle);
                    host.destroy(&pairing.handle);
                    report.skipped.push(SkippedRecord {
                        type_name: pairing.schema.type_name.clone(),
                        index:     Some(pairing.index),
                        id:        Some(pairing.mirror.id.clone()),
                        reason:    err.to_string(),
                    });
                }
            }
        }
        log::debug!("Load '{name}' pass 3: fields copied");

        self.registry.clear();
        self.registry.absorb(staging);

        log::info!(
            "Loaded '{name}': {} instance(s), {} destroyed, {} skipped, {} dangling",
            report.instantiated,
            report.destroyed,
            report.skipped.len(),
            report.dangling.len()
        );
        Ok(report)
    }

    /// Decode a save into `(type name, mirror)` pairs without instantiating
    /// anything. Records that fail to decode are skipped with a warning.
    pub fn read_mirrors(&self, name: &str) -> PersistResult<Vec<(TypeName, DataMirror)>> {
        let document = self.read_document(name)?;
        let mut mirrors = Vec::with_capacity(document.record_count());
        for section in &document.sections {
            for (index, record) in section.records.iter().enumerate() {
                match decode_record(record) {
                    Ok(mirror) => mirrors.push((section.type_name.clone(), mirror)),
                    Err(err) => log::warn!("Skipping {} record #{index}: {err}", section.type_name),
                }
            }
        }
        Ok(mirrors)
    }

    pub fn list_saves(&self) -> PersistResult<Vec<SaveSummary>> {
        self.store.list()
    }

    pub fn delete_save(&self, name: &str) -> PersistResult<bool> {
        self.store.delete(name)
    }

    // ── Internals ──────────────────────────────────────────────

    fn schema(&self, type_name: &str) -> PersistResult<&GeneratedSchema> {
        self.catalog.schema(type_name).ok_or_else(|| PersistError::MissingSchema {
            type_name: type_name.to_string(),
        })
    }

    fn node_adaptor(&self, name: &str) -> PersistResult<&dyn DynNodeAdaptor> {
        self.adaptors.node(name).ok_or_else(|| PersistError::Converter {
            converter: name.to_string(),
            reason:    "node adaptor not registered".to_string(),
        })
    }

    fn apply_node_records<H: SceneHost>(&self, host: &mut H, pairing: &Pairing<'_>) -> PersistResult<()> {
        for name in &pairing.schema.node_adaptors {
            let Some(record) = pairing.mirror.node.get(name) else {
                continue;
            };
            self.node_adaptor(name)?
                .apply(&mut *host, pairing.handle.node(), record.clone())?;
        }
        Ok(())
    }

    fn read_document(&self, name: &str) -> PersistResult<SaveDocument> {
        let text = self.store.read(name)?.ok_or_else(|| PersistError::SaveNotFound {
            name: name.to_string(),
        })?;
        let document = self.codec.decode(&text)?;
        if document.version > DOCUMENT_VERSION {
            log::warn!(
                "Save '{name}' has document version {} (newer than {DOCUMENT_VERSION}); reading anyway",
                document.version
            );
        }
        Ok(document)
    }

    /// Explicit template, else the type's default template, else the bare
    /// factory. A missing default template falls back to the factory.
    fn instantiate<H: SceneHost + ?Sized>(
        &self,
        host: &mut H,
        schema: &GeneratedSchema,
        template: Option<&str>,
        name: Option<&str>,
    ) -> PersistResult<Handle> {
        let type_name = schema.type_name.as_str();
        let factory = self.catalog.factory(type_name);
        if let Some(template) = template {
            return host.create(CreateRequest::new(type_name).template(Some(template)).name(name));
        }
        if let Some(default) = schema.template.as_deref() {
            match host.create(CreateRequest::new(type_name).template(Some(default)).name(name)) {
                Ok(handle) => return Ok(handle),
                Err(err) if factory.is_some() => {
                    log::debug!("{type_name}: template '{default}' unavailable ({err}); using factory");
                }
                Err(err) => return Err(err),
            }
        }
        host.create(CreateRequest::new(type_name).name(name).factory(factory))
    }

    fn instantiate_record<H: SceneHost + ?Sized>(
        &self,
        host: &mut H,
        schema: &GeneratedSchema,
        record: &str,
        staging: &mut InstanceRegistry,
    ) -> PersistResult<(DataMirror, Handle)> {
        let mirror = decode_record(record)?;
        if mirror.id.is_empty() {
            return Err(PersistError::Instantiation {
                type_name: schema.type_name.clone(),
                reason:    "record carries no identity".to_string(),
            });
        }
        let handle = self.instantiate(host, schema, None, None)?;
        staging.update_identity(&handle, mirror.id.clone());
        Ok((mirror, handle))
    }

    fn place<H: SceneHost + ?Sized>(
        &self,
        host: &mut H,
        pairing: &Pairing<'_>,
        staging: &InstanceRegistry,
    ) -> PersistResult<()> {
        let Some(placement) = pairing.mirror.hierarchy.as_ref() else {
            return Ok(());
        };

        let parent: Option<NodeId> = if let Some(anchor) = &placement.anchor {
            Some(host.anchor(anchor).ok_or_else(|| PersistError::Hierarchy {
                reason: format!("anchor '{anchor}' not found"),
            })?)
        } else if let Some(parent_id) = &placement.parent {
            Some(
                staging
                    .get(parent_id)
                    .map(|p| p.node())
                    .ok_or_else(|| PersistError::Hierarchy {
                        reason: format!("parent '{parent_id}' not in the loaded graph"),
                    })?,
            )
        } else {
            None
        };

        let index = placement.sibling_index.min(host.sibling_count(parent));
        host.set_parent(pairing.handle.node(), parent, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{FieldType, TypeDescriptor},
        instance::{FieldCtx, FieldValue, Persistable},
        scene::MemoryScene,
        store::SqliteStore,
    };
    use std::any::Any;

    #[derive(Debug, Default)]
    struct Beacon {
        id:    Identity,
        range: i64,
    }

    impl PersistableType for Beacon {
        const TYPE_NAME: &'static str = "Beacon";

        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::builder(Self::TYPE_NAME)
                .identity("id")
                .field("range", FieldType::int())
                .build()
        }
    }

    impl Persistable for Beacon {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }

        fn identity(&self) -> &str {
            &self.id
        }

        fn set_identity(&mut self, id: Identity) {
            self.id = id;
        }

        fn read_field(&self, field: &str) -> Option<FieldValue> {
            match field {
                "id" => Some(FieldValue::Text(self.id.clone())),
                "range" => Some(FieldValue::Int(self.range)),
                _ => None,
            }
        }

        fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()> {
            let ctx = FieldCtx::new(Self::TYPE_NAME, field);
            match field {
                "id" => self.id = value.into_text(ctx)?,
                "range" => self.range = value.into_int(ctx)?,
                _ => return Err(ctx.unknown()),
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// The engine needs nothing from the demo types.
    #[test]
    fn host_declared_types_round_trip() {
        let mut catalog = SchemaCatalog::new();
        catalog.declare::<Beacon>();
        let store = SqliteStore::in_memory().unwrap();
        let mut engine = PersistEngine::new(
            PersistConfig::seeded(17),
            catalog,
            AdaptorRegistry::new(),
            Box::new(store),
        );
        assert!(engine.generation_report().is_clean());

        let mut scene = MemoryScene::new();
        let beacon = engine.spawn(&mut scene, "Beacon", SpawnOptions::default()).unwrap();
        beacon.with_mut(|b: &mut Beacon| b.range = 250);
        let id = beacon.identity();

        let saved = engine.save(&scene, "beacons").unwrap();
        assert_eq!(saved.written, 1);
        beacon.with_mut(|b: &mut Beacon| b.range = 0);

        let loaded = engine.load(&mut scene, "beacons").unwrap();
        assert!(loaded.is_clean(), "{loaded:?}");
        let range = engine.resolve::<Beacon>(&id).and_then(|h| h.with(|b: &Beacon| b.range));
        assert_eq!(range, Some(250));
    }
}
