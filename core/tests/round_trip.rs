//! Save then load reproduces field values, identities and references.

use persistor_core::{
    engine::{PersistEngine, SpawnOptions},
    instance::{Handle, Link},
    sample::{self, Boss, Enemy, Squad, Vec3},
    scene::MemoryScene,
    store::DocumentStore,
};
use serde_json::json;

fn spawn(engine: &mut PersistEngine, scene: &mut MemoryScene, type_name: &str) -> Handle {
    engine
        .spawn(scene, type_name, SpawnOptions::default())
        .unwrap_or_else(|e| panic!("spawn {type_name}: {e}"))
}

fn named(name: &str) -> SpawnOptions<'_> {
    SpawnOptions {
        name: Some(name),
        ..SpawnOptions::default()
    }
}

fn enemy(engine: &PersistEngine, id: &str) -> Handle {
    engine
        .resolve::<Enemy>(id)
        .unwrap_or_else(|| panic!("{id} should resolve after load"))
}

#[test]
fn reload_restores_saved_values_and_rewires_references() {
    let mut engine = PersistEngine::build_test(42).unwrap();
    let mut scene = sample::scene();

    let a = spawn(&mut engine, &mut scene, "Enemy");
    let a_id = a.identity();
    assert!(a_id.starts_with("Enemy_"));
    assert_eq!(a.with(|e: &Enemy| e.health), Some(100));

    let b = spawn(&mut engine, &mut scene, "Enemy");
    let b_id = b.identity();
    b.with_mut(|e: &mut Enemy| e.target = Link::to(&a));

    engine.save(&scene, "s1").unwrap();
    a.with_mut(|e: &mut Enemy| e.health = 50);

    let report = engine.load(&mut scene, "s1").unwrap();
    assert_eq!(report.instantiated, 2);
    assert_eq!(report.destroyed, 2);
    assert!(report.is_clean(), "{report:?}");

    let a2 = enemy(&engine, &a_id);
    let b2 = enemy(&engine, &b_id);
    assert_eq!(a2.with(|e: &Enemy| e.health), Some(100), "saved health comes back");
    assert!(!a2.ptr_eq(&a), "load builds new instances");

    let target = b2.with(|e: &Enemy| e.target.clone()).unwrap();
    assert!(target.points_to(&a2), "B' must point at A'");
    assert!(!target.points_to(&a), "B' must not point at the pre-load A");
    assert_eq!(target.identity().as_deref(), Some(a_id.as_str()));
    assert_eq!(scene.instance_count(), 2, "old instances are gone from the scene");
}

#[test]
fn every_representation_survives_a_round_trip() {
    let mut engine = PersistEngine::build_test(7).unwrap();
    let mut scene = sample::scene();

    let a = spawn(&mut engine, &mut scene, "Enemy");
    let b = spawn(&mut engine, &mut scene, "Enemy");
    let c = spawn(&mut engine, &mut scene, "Enemy");
    a.with_mut(|e: &mut Enemy| {
        e.name = "Scout".to_string();
        e.speed = 6.25;
        e.alert = true;
        e.position = Vec3::new(1.5, -2.0, 8.0);
        e.patrol = vec![Link::to(&b), Link::to(&c), Link::to(&b)];
        e.tags = vec!["fast".to_string(), "ranged".to_string()];
    });
    let (a_id, b_id, c_id) = (a.identity(), b.identity(), c.identity());

    engine.save(&scene, "all").unwrap();
    engine.load(&mut scene, "all").unwrap();

    let a2 = enemy(&engine, &a_id);
    let b2 = enemy(&engine, &b_id);
    let c2 = enemy(&engine, &c_id);
    a2.with(|e: &Enemy| {
        assert_eq!(e.id, a_id);
        assert_eq!(e.name, "Scout");
        assert_eq!(e.health, 100);
        assert_eq!(e.speed, 6.25);
        assert!(e.alert);
        assert_eq!(e.position, Vec3::new(1.5, -2.0, 8.0));
        assert_eq!(e.tags, vec!["fast", "ranged"]);
        assert_eq!(e.patrol.len(), 3);
        assert!(e.patrol[0].points_to(&b2));
        assert!(e.patrol[1].points_to(&c2));
        assert!(e.patrol[2].points_to(&b2));
        assert!(e.target.is_absent(), "unset reference stays absent");
    })
    .expect("A' is an Enemy");
}

#[test]
fn an_instance_may_reference_itself() {
    let mut engine = PersistEngine::build_test(8).unwrap();
    let mut scene = sample::scene();

    let a = spawn(&mut engine, &mut scene, "Enemy");
    a.with_mut(|e: &mut Enemy| e.target = Link::to(&a));
    let id = a.identity();

    engine.save(&scene, "selfie").unwrap();
    let report = engine.load(&mut scene, "selfie").unwrap();
    assert!(report.is_clean(), "{report:?}");

    let a2 = enemy(&engine, &id);
    let target = a2.with(|e: &Enemy| e.target.clone()).unwrap();
    assert!(target.points_to(&a2));
}

#[test]
fn cross_type_references_and_type_bound_converters() {
    let mut engine = PersistEngine::build_test(11).unwrap();
    let mut scene = sample::scene();

    let boss = spawn(&mut engine, &mut scene, "Boss");
    let grunt = spawn(&mut engine, &mut scene, "Enemy");
    let squad = spawn(&mut engine, &mut scene, "Squad");
    boss.with_mut(|b: &mut Boss| {
        b.phase = 3;
        b.rally_point = Vec3::new(10.0, 0.0, 10.0);
        b.base.position = Vec3::new(1.0, 2.0, 3.0);
        b.base.target = Link::to(&grunt);
    });
    grunt.with_mut(|e: &mut Enemy| e.position = Vec3::new(4.0, 5.0, 6.0));
    squad.with_mut(|s: &mut Squad| {
        s.callsign = "Alpha".to_string();
        s.leader = Link::to(&grunt);
        s.members = vec![Link::to(&grunt)];
    });
    let (boss_id, grunt_id, squad_id) = (boss.identity(), grunt.identity(), squad.identity());
    assert!(boss_id.starts_with("Boss_"));

    engine.save(&scene, "mixed").unwrap();

    let mirrors = engine.read_mirrors("mixed").unwrap();
    let fields = |id: &str| {
        mirrors
            .iter()
            .find(|(_, m)| m.id == id)
            .map(|(_, m)| m.fields.clone())
            .unwrap_or_else(|| panic!("no record for {id}"))
    };
    assert_eq!(fields(&boss_id)["position"], json!([1.0, 2.0, 3.0]), "Boss binds vec3_array");
    assert_eq!(fields(&boss_id)["phase"], json!(3));
    assert_eq!(fields(&grunt_id)["position"], json!({ "x": 4.0, "y": 5.0, "z": 6.0 }));
    assert_eq!(fields(&squad_id)["leader_id"], json!(grunt_id));
    assert_eq!(fields(&squad_id)["members_ids"], json!([grunt_id]));

    engine.load(&mut scene, "mixed").unwrap();

    let grunt2 = enemy(&engine, &grunt_id);
    let boss2 = engine.resolve::<Boss>(&boss_id).expect("Boss comes back as a Boss");
    boss2
        .with(|b: &Boss| {
            assert_eq!(b.phase, 3);
            assert_eq!(b.rally_point, Vec3::new(10.0, 0.0, 10.0));
            assert_eq!(b.base.position, Vec3::new(1.0, 2.0, 3.0));
            assert!(b.base.target.points_to(&grunt2));
        })
        .expect("Boss' is a Boss");
    let squad2 = engine.resolve::<Squad>(&squad_id).expect("Squad comes back");
    squad2
        .with(|s: &Squad| {
            assert_eq!(s.callsign, "Alpha");
            assert!(s.leader.points_to(&grunt2));
            assert!(s.members[0].points_to(&grunt2));
        })
        .expect("Squad' is a Squad");
}

#[test]
fn saving_twice_without_changes_writes_the_same_document() {
    let mut engine = PersistEngine::build_test(5).unwrap();
    let mut scene = sample::scene();
    let a = spawn(&mut engine, &mut scene, "Enemy");
    let b = spawn(&mut engine, &mut scene, "Squad");
    b.with_mut(|s: &mut Squad| s.leader = Link::to(&a));

    engine.save(&scene, "one").unwrap();
    engine.save(&scene, "two").unwrap();
    let one = engine.store().read("one").unwrap().expect("one stored");
    let two = engine.store().read("two").unwrap().expect("two stored");
    assert_eq!(one, two);

    engine.load(&mut scene, "one").unwrap();
    engine.save(&scene, "three").unwrap();
    let three = engine.store().read("three").unwrap().expect("three stored");
    assert_eq!(one, three, "load then save reproduces the document");
}

#[test]
fn a_subtype_loads_into_base_typed_references() {
    let mut engine = PersistEngine::build_test(12).unwrap();
    let mut scene = sample::scene();

    let boss = spawn(&mut engine, &mut scene, "Boss");
    let grunt = spawn(&mut engine, &mut scene, "Enemy");
    let squad = spawn(&mut engine, &mut scene, "Squad");
    squad.with_mut(|s: &mut Squad| {
        s.leader = Link::to(&boss);
        s.members = vec![Link::to(&grunt), Link::to(&boss)];
    });
    grunt.with_mut(|e: &mut Enemy| {
        e.target = Link::to(&boss);
        e.patrol = vec![Link::to(&boss)];
    });
    let (boss_id, grunt_id, squad_id) = (boss.identity(), grunt.identity(), squad.identity());

    engine.save(&scene, "chain").unwrap();
    let report = engine.load(&mut scene, "chain").unwrap();
    assert!(report.dangling.is_empty(), "a Boss satisfies Enemy references: {:?}", report.dangling);
    assert!(report.is_clean(), "{report:?}");

    let boss2 = engine.resolve::<Boss>(&boss_id).expect("Boss comes back as a Boss");
    assert!(
        engine.resolve::<Enemy>(&boss_id).is_some_and(|h| h.ptr_eq(&boss2)),
        "a Boss also resolves as an Enemy"
    );
    assert!(engine.resolve::<Boss>(&grunt_id).is_none(), "an Enemy never resolves as a Boss");

    let grunt2 = enemy(&engine, &grunt_id);
    squad2_links(&engine, &squad_id, |leader, members| {
        assert!(leader.points_to(&boss2), "leader rewired to the loaded Boss");
        assert!(members[0].points_to(&grunt2));
        assert!(members[1].points_to(&boss2));
    });
    grunt2
        .with(|e: &Enemy| {
            assert!(e.target.points_to(&boss2));
            assert!(e.patrol[0].points_to(&boss2));
        })
        .expect("grunt' is an Enemy");
}

fn squad2_links(engine: &PersistEngine, id: &str, check: impl FnOnce(&Link, &[Link])) {
    engine
        .resolve::<Squad>(id)
        .expect("Squad comes back")
        .with(|s: &Squad| check(&s.leader, &s.members))
        .expect("Squad' is a Squad");
}

#[test]
fn node_names_survive_a_reload() {
    let mut engine = PersistEngine::build_test(13).unwrap();
    let mut scene = sample::scene();
    let sentry = engine.spawn(&mut scene, "Enemy", named("Sentry")).unwrap();
    let boss = engine.spawn(&mut scene, "Boss", named("Warlord Kai")).unwrap();
    let squad = engine.spawn(&mut scene, "Squad", named("Alpha Team")).unwrap();
    let plain = spawn(&mut engine, &mut scene, "Enemy");
    let ids = [sentry.identity(), boss.identity(), squad.identity(), plain.identity()];

    engine.save(&scene, "names").unwrap();
    let mirrors = engine.read_mirrors("names").unwrap();
    let sentry_record = mirrors
        .iter()
        .find(|(_, m)| m.id == ids[0])
        .map(|(_, m)| m.node.clone())
        .expect("Sentry saved");
    assert_eq!(sentry_record["node_name"], json!("Sentry"));

    let report = engine.load(&mut scene, "names").unwrap();
    assert!(report.is_clean(), "{report:?}");

    let name_after = |id: &str| {
        let handle = engine.registry().get(id).unwrap_or_else(|| panic!("{id} reloads"));
        scene.name_of(handle.node()).map(str::to_string)
    };
    assert_eq!(name_after(&ids[0]).as_deref(), Some("Sentry"));
    assert_eq!(name_after(&ids[1]).as_deref(), Some("Warlord Kai"), "Boss inherits the node adaptor");
    assert_eq!(name_after(&ids[2]).as_deref(), Some("Alpha Team"));
    assert_eq!(name_after(&ids[3]).as_deref(), Some("Enemy"));
}
