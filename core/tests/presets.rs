//! Instantiation paths and presets.

use persistor_core::{
    engine::{PersistEngine, SpawnOptions},
    error::PersistError,
    sample::{self, Boss, Enemy, Squad},
    scene::MemoryScene,
    schema::preset::Preset,
};
use serde_json::json;

#[test]
fn a_preset_overrides_template_values() {
    let mut engine = PersistEngine::build_test(51).unwrap();
    let mut scene = sample::scene();
    let elite = Preset::new("Enemy")
        .with("health", 250)
        .with("alert", true)
        .with("tags", json!(["elite", "shielded"]));

    let handle = engine
        .spawn(
            &mut scene,
            "Enemy",
            SpawnOptions {
                preset: Some(&elite),
                ..SpawnOptions::default()
            },
        )
        .unwrap();

    handle
        .with(|e: &Enemy| {
            assert_eq!(e.name, "Grunt", "untouched fields keep the template value");
            assert_eq!(e.health, 250);
            assert!(e.alert);
            assert_eq!(e.tags, vec!["elite", "shielded"]);
        })
        .unwrap();
    assert!(!handle.identity().is_empty(), "identity is minted after the preset");
}

#[test]
fn a_preset_for_another_type_is_rejected() {
    let mut engine = PersistEngine::build_test(52).unwrap();
    let mut scene = sample::scene();
    let wrong = Preset::new("Squad").with("callsign", "Alpha");

    let err = engine
        .spawn(
            &mut scene,
            "Enemy",
            SpawnOptions {
                preset: Some(&wrong),
                ..SpawnOptions::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, PersistError::Instantiation { .. }), "{err}");
    assert_eq!(scene.instance_count(), 0, "the half-built instance is destroyed");
    assert!(engine.registry().is_empty());
}

#[test]
fn presets_cannot_carry_references_or_converted_fields() {
    let mut engine = PersistEngine::build_test(53).unwrap();
    let mut scene = sample::scene();

    for field in ["target", "position", "id"] {
        let preset = Preset::new("Enemy").with(field, json!(null));
        let err = engine
            .spawn(
                &mut scene,
                "Enemy",
                SpawnOptions {
                    preset: Some(&preset),
                    ..SpawnOptions::default()
                },
            )
            .unwrap_err();
        match err {
            PersistError::UnknownField { type_name, field: rejected } => {
                assert_eq!(type_name, "Enemy");
                assert_eq!(rejected, field);
            }
            other => panic!("expected UnknownField for {field}, got {other}"),
        }
    }
    assert_eq!(scene.instance_count(), 0);
}

#[test]
fn presets_load_from_json() {
    let preset = Preset::from_json(r#"{ "type_name": "Enemy", "values": { "speed": 9.5, "alert": true } }"#)
        .unwrap();
    assert_eq!(preset.type_name, "Enemy");
    assert_eq!(preset.values["speed"], json!(9.5));

    let mut engine = PersistEngine::build_test(54).unwrap();
    let mut scene = sample::scene();
    let handle = engine
        .spawn(
            &mut scene,
            "Enemy",
            SpawnOptions {
                preset: Some(&preset),
                ..SpawnOptions::default()
            },
        )
        .unwrap();
    assert_eq!(handle.with(|e: &Enemy| (e.speed, e.alert)), Some((9.5, true)));

    assert!(Preset::from_json("{ not json").is_err());
}

#[test]
fn a_captured_preset_reproduces_direct_fields() {
    let mut engine = PersistEngine::build_test(55).unwrap();
    let mut scene = sample::scene();
    let source = engine.spawn(&mut scene, "Boss", SpawnOptions::default()).unwrap();
    source.with_mut(|b: &mut Boss| {
        b.base.name = "Tyrant".to_string();
        b.base.tags = vec!["final".to_string()];
        b.phase = 4;
    });

    let preset = engine.capture_preset(&source).unwrap();
    assert_eq!(preset.type_name, "Boss");
    let keys: Vec<&str> = preset.values.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["alert", "health", "name", "phase", "speed", "tags"]);

    let copy = engine
        .spawn(
            &mut scene,
            "Boss",
            SpawnOptions {
                preset: Some(&preset),
                ..SpawnOptions::default()
            },
        )
        .unwrap();
    copy.with(|b: &Boss| {
        assert_eq!(b.base.name, "Tyrant");
        assert_eq!(b.base.health, 1000);
        assert_eq!(b.base.tags, vec!["final"]);
        assert_eq!(b.phase, 4);
    })
    .unwrap();
    assert_ne!(copy.identity(), source.identity());
}

#[test]
fn explicit_templates_must_exist_and_match() {
    let mut engine = PersistEngine::build_test(56).unwrap();
    let mut scene = sample::scene();

    for template in ["dragon", "boss"] {
        let err = engine
            .spawn(
                &mut scene,
                "Enemy",
                SpawnOptions {
                    template: Some(template),
                    ..SpawnOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, PersistError::Instantiation { .. }), "{template}: {err}");
    }
    assert!(engine.registry().is_empty());
}

#[test]
fn types_without_a_template_use_their_factory() {
    let mut engine = PersistEngine::build_test(57).unwrap();
    let mut scene = sample::scene();
    let squad = engine
        .spawn(
            &mut scene,
            "Squad",
            SpawnOptions {
                name: Some("Alpha Team"),
                ..SpawnOptions::default()
            },
        )
        .unwrap();

    assert_eq!(squad.with(|s: &Squad| (s.callsign.clone(), s.morale)), Some((String::new(), 0.0)));
    assert_eq!(scene.name_of(squad.node()), Some("Alpha Team"));
}

#[test]
fn a_missing_default_template_falls_back_to_the_factory() {
    let mut engine = PersistEngine::build_test(58).unwrap();
    let mut bare = MemoryScene::new();
    let handle = engine.spawn(&mut bare, "Enemy", SpawnOptions::default()).unwrap();

    assert_eq!(handle.with(|e: &Enemy| e.health), Some(0), "factory builds a zeroed enemy");
    assert_eq!(bare.name_of(handle.node()), Some("Enemy"));
}

#[test]
fn spawning_an_unknown_type_fails() {
    let mut engine = PersistEngine::build_test(59).unwrap();
    let mut scene = sample::scene();

    let err = engine.spawn(&mut scene, "Effect", SpawnOptions::default()).unwrap_err();
    assert!(matches!(err, PersistError::MissingSchema { ref type_name } if type_name == "Effect"));
    assert_eq!(scene.instance_count(), 0);
}
