//! Schema generation: classification, validation, determinism, rendering.

use persistor_core::{
    catalog::SchemaCatalog,
    config::PersistConfig,
    descriptor::{FieldDescriptor, FieldType, ScalarKind, TypeDescriptor},
    error::SchemaError,
    sample,
    schema::Representation,
};
use std::path::Path;

fn generated() -> SchemaCatalog {
    let mut catalog = sample::catalog();
    let report = catalog.generate(&sample::adaptors());
    assert!(report.is_clean(), "sample types must generate cleanly: {:?}", report.failed);
    catalog
}

#[test]
fn sample_types_generate_and_ignored_types_are_skipped() {
    let mut catalog = sample::catalog();
    let report = catalog.generate(&sample::adaptors());

    assert_eq!(report.generated, vec!["Boss", "Enemy", "Squad"]);
    assert_eq!(report.ignored, vec!["Effect"]);
    assert!(report.failed.is_empty());
    assert!(catalog.schema("Effect").is_none(), "ignored types get no schema");
}

#[test]
fn fields_are_classified_into_one_representation_each() {
    let catalog = generated();
    let enemy = catalog.schema("Enemy").expect("Enemy schema");

    assert_eq!(enemy.identity_field, "id");
    assert_eq!(enemy.prefix, "Enemy");
    assert!(enemy.hierarchical);
    assert_eq!(enemy.template.as_deref(), Some("enemy"));

    let keys: Vec<&str> = enemy.fields.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["name", "health", "speed", "alert", "target_id", "position", "patrol_ids", "tags"],
        "identity excluded, references suffixed, declaration order kept"
    );

    let repr = |source: &str| enemy.field(source).expect(source).repr.clone();
    assert_eq!(repr("health"), Representation::Direct { kind: ScalarKind::Int });
    assert_eq!(
        repr("target"),
        Representation::Reference {
            target: "Enemy".to_string()
        }
    );
    assert_eq!(
        repr("position"),
        Representation::Converted {
            converter: "vec3".to_string()
        }
    );
    assert_eq!(
        repr("patrol"),
        Representation::ReferenceList {
            target: "Enemy".to_string()
        }
    );
    assert_eq!(repr("tags"), Representation::DirectList { kind: ScalarKind::Text });
}

#[test]
fn inherited_fields_come_first_and_type_bindings_beat_globals() {
    let catalog = generated();
    let boss = catalog.schema("Boss").expect("Boss schema");

    let sources: Vec<&str> = boss.fields.iter().map(|f| f.source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["name", "health", "speed", "alert", "target", "position", "patrol", "tags", "phase", "rally_point"]
    );
    for field in ["position", "rally_point"] {
        assert_eq!(
            boss.field(field).expect(field).repr,
            Representation::Converted {
                converter: "vec3_array".to_string()
            },
            "{field} must use the Boss-level binding"
        );
    }
    assert_eq!(boss.prefix, "Boss");
    assert_eq!(catalog.schema("Squad").expect("Squad schema").prefix, "SQ");
}

#[test]
fn generation_is_idempotent() {
    let adaptors = sample::adaptors();
    let config = PersistConfig::default();
    let mut catalog = sample::catalog();

    catalog.generate(&adaptors);
    let first: Vec<_> = catalog.schemas().cloned().collect();
    let first_src = catalog.render_all(&config, &adaptors);

    catalog.generate(&adaptors);
    let second: Vec<_> = catalog.schemas().cloned().collect();
    let second_src = catalog.render_all(&config, &adaptors);

    assert_eq!(first, second, "schemas must not change between runs");
    assert_eq!(first_src, second_src, "rendered source must be byte-identical");
}

#[test]
fn presets_expose_direct_fields_only() {
    let catalog = generated();
    let enemy = catalog.schema("Enemy").expect("Enemy schema");
    let preset: Vec<&str> = enemy.preset_fields().map(|f| f.source.as_str()).collect();
    assert_eq!(preset, vec!["name", "health", "speed", "alert", "tags"]);
}

#[test]
fn a_bad_type_fails_alone() {
    let mut catalog = sample::catalog();
    catalog
        .declare_with(
            TypeDescriptor::builder("NoId").field("hp", FieldType::int()).build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("TwoIds").identity("a").identity("b").build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("IntId").identity_typed("id", FieldType::int()).build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("Loose")
                .identity("id")
                .field("widget", FieldType::named("Widget"))
                .build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("Bound")
                .identity("id")
                .field_with(FieldDescriptor::new("temp", FieldType::named("Celsius")).with_converter("nope"))
                .build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("Nested")
                .identity("id")
                .field("grid", FieldType::list(FieldType::list(FieldType::int())))
                .build(),
            None,
        )
        .declare_with(
            TypeDescriptor::builder("Spawner")
                .identity("id")
                .field("effect", FieldType::named("Effect"))
                .build(),
            None,
        )
        .declare_with(TypeDescriptor::builder("Empty").build(), None);

    let report = catalog.generate(&sample::adaptors());
    assert_eq!(report.generated, vec!["Boss", "Enemy", "Squad"], "good types still generate");

    let failure = |name: &str| -> SchemaError {
        report
            .failed
            .iter()
            .find(|(t, _)| t == name)
            .map(|(_, e)| e.clone())
            .unwrap_or_else(|| panic!("{name} should have failed"))
    };
    assert_eq!(
        failure("NoId"),
        SchemaError::MissingIdentity {
            type_name: "NoId".to_string()
        }
    );
    assert_eq!(
        failure("TwoIds"),
        SchemaError::MultipleIdentities {
            type_name: "TwoIds".to_string(),
            count:     2,
        }
    );
    assert_eq!(
        failure("IntId"),
        SchemaError::NonStringIdentity {
            type_name: "IntId".to_string(),
            field:     "id".to_string(),
        }
    );
    assert_eq!(
        failure("Loose"),
        SchemaError::UnresolvableField {
            type_name:  "Loose".to_string(),
            field:      "widget".to_string(),
            value_type: "Widget".to_string(),
        }
    );
    assert_eq!(
        failure("Bound"),
        SchemaError::UnknownConverter {
            type_name: "Bound".to_string(),
            field:     "temp".to_string(),
            converter: "nope".to_string(),
        }
    );
    assert_eq!(
        failure("Nested"),
        SchemaError::UnresolvableField {
            type_name:  "Nested".to_string(),
            field:      "grid".to_string(),
            value_type: "Vec<Vec<i64>>".to_string(),
        }
    );
    assert!(
        matches!(failure("Spawner"), SchemaError::UnresolvableField { .. }),
        "ignored types are not reference targets"
    );
    assert_eq!(
        failure("Empty"),
        SchemaError::NoFields {
            type_name: "Empty".to_string()
        }
    );
    assert!(catalog.schema("Loose").is_none());
}

#[test]
fn rendered_source_follows_config_naming() {
    let catalog = generated();
    let adaptors = sample::adaptors();
    let config = PersistConfig::default();
    let files = catalog.render_all(&config, &adaptors);

    let find = |path: &str| {
        files
            .iter()
            .find(|f| f.path == Path::new(path))
            .unwrap_or_else(|| panic!("missing rendered file {path}"))
    };

    let data = find("generated/enemy_generated/enemy_data.rs");
    assert!(data.contents.starts_with("// @generated by persistor. DO NOT EDIT."));
    assert!(data.contents.contains("pub struct EnemyData {"));
    assert!(data.contents.contains("pub id: String,"));
    assert!(data.contents.contains("pub target_id: Option<String>,"));
    assert!(data.contents.contains("pub patrol_ids: Vec<Option<String>>,"));
    assert!(data.contents.contains("pub tags: Vec<String>,"));
    assert!(data.contents.contains("registry.resolve_named(id, \"Enemy\")"));

    let preset = find("generated/enemy_generated/enemy_preset.rs");
    assert!(preset.contents.contains("pub struct EnemyPreset {"));
    assert!(preset.contents.contains("pub health: i64,"));
    assert!(!preset.contents.contains("target"), "presets never carry references");
    assert!(!preset.contents.contains("position"), "presets never carry converted fields");

    let flat = PersistConfig {
        type_subfolders: false,
        data_suffix: "Mirror".to_string(),
        ..PersistConfig::default()
    };
    let files = catalog.render_all(&flat, &adaptors);
    assert!(files.iter().any(|f| f.path == Path::new("generated/squad_mirror.rs")
        && f.contents.contains("pub struct SquadMirror {")));
}

#[test]
fn a_type_folder_overrides_the_configured_layout() {
    let adaptors = sample::adaptors();
    let mut catalog = sample::catalog();
    catalog.declare_with(
        TypeDescriptor::builder("Turret")
            .identity("id")
            .field("arc", FieldType::float())
            .generated_folder("src/defences/persist")
            .build(),
        None,
    );
    assert!(catalog.generate(&adaptors).is_clean());
    assert_eq!(
        catalog.schema("Turret").expect("Turret schema").generated_folder.as_deref(),
        Some("src/defences/persist")
    );

    for config in [
        PersistConfig::default(),
        PersistConfig {
            type_subfolders: false,
            generated_code_dir: "elsewhere".to_string(),
            ..PersistConfig::default()
        },
    ] {
        let files = catalog.render_all(&config, &adaptors);
        let turret: Vec<_> = files
            .iter()
            .filter(|f| f.contents.contains("Turret"))
            .map(|f| f.path.clone())
            .collect();
        assert_eq!(
            turret,
            vec![
                Path::new("src/defences/persist/turret_data.rs").to_path_buf(),
                Path::new("src/defences/persist/turret_preset.rs").to_path_buf(),
            ],
            "the type folder wins over folder and subfolder settings"
        );
        assert!(
            files
                .iter()
                .any(|f| f.path.starts_with(&config.generated_code_dir) && f.contents.contains("pub struct EnemyData")),
            "types without a folder keep the configured layout"
        );
    }
}

#[test]
fn inherited_fields_render_through_the_embedded_base() {
    let catalog = generated();
    let adaptors = sample::adaptors();
    let files = catalog.render_all(&PersistConfig::default(), &adaptors);
    let find = |path: &str| {
        files
            .iter()
            .find(|f| f.path == Path::new(path))
            .unwrap_or_else(|| panic!("missing rendered file {path}"))
    };

    let data = &find("generated/boss_generated/boss_data.rs").contents;
    assert!(data.contains("id: unit.base.id.clone(),"), "identity lives on the base:\n{data}");
    assert!(data.contains("name: unit.base.name.clone(),"));
    assert!(data.contains("unit.base.target = "));
    assert!(data.contains("phase: unit.phase,"), "own fields stay direct");
    assert!(!data.contains("unit.name"), "no flat access to inherited fields");

    let preset = &find("generated/boss_generated/boss_preset.rs").contents;
    assert!(preset.contains("unit.base.health = self.health;"));
    assert!(preset.contains("pub health: i64,"), "preset keys keep the field name");
    assert!(preset.contains("unit.phase = self.phase;"));

    let enemy = &find("generated/enemy_generated/enemy_data.rs").contents;
    assert!(enemy.contains("name: unit.name.clone(),"));
}

#[test]
fn subtypes_record_their_base_chain() {
    let catalog = generated();
    assert_eq!(catalog.schema("Boss").expect("Boss schema").bases, vec!["Enemy"]);
    assert!(catalog.schema("Enemy").expect("Enemy schema").bases.is_empty());
}

#[test]
fn node_adaptors_must_be_registered() {
    let mut catalog = sample::catalog();
    catalog.declare_with(
        TypeDescriptor::builder("Crate")
            .identity("id")
            .field("loot", FieldType::int())
            .node_adaptor("transform")
            .build(),
        None,
    );
    let report = catalog.generate(&sample::adaptors());

    assert_eq!(
        report.failed,
        vec![(
            "Crate".to_string(),
            SchemaError::UnknownNodeAdaptor {
                type_name: "Crate".to_string(),
                adaptor:   "transform".to_string(),
            }
        )]
    );
    assert_eq!(
        catalog.schema("Enemy").expect("Enemy schema").node_adaptors,
        vec!["node_name"]
    );
    let data = catalog.render_all(&PersistConfig::default(), &sample::adaptors());
    assert!(data
        .iter()
        .any(|f| f.contents.contains("pub node: std::collections::BTreeMap<String, serde_json::Value>,")));
}
