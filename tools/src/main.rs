//! persistor: headless command surface over persistor-core.
//!
//! Usage:
//!   persistor generate --out ./src
//!   persistor demo --db saves.db --seed 42 --name slot1
//!   persistor list --db saves.db
//!   persistor inspect --db saves.db --name slot1
//!   persistor delete --dir ./saves --name slot1
//!
//! Every command accepts `--config settings.json`. `--dir` selects the
//! directory store instead of SQLite.

use anyhow::{bail, Result};
use persistor_core::{
    config::PersistConfig,
    engine::{PersistEngine, SpawnOptions},
    host::HierarchyHost,
    instance::{Handle, Link},
    sample::{self, Enemy, Squad, Vec3},
    schema::{mirror::DataMirror, preset::Preset},
    store::{DocumentStore, FileStore, SqliteStore},
};
use std::env;
use std::path::Path;

#[derive(serde::Serialize)]
struct InspectedRecord<'a> {
    type_name: &'a str,
    mirror:    &'a DataMirror,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = match flag(&args, "--config") {
        Some(path) => PersistConfig::load(path)?,
        None => PersistConfig::default(),
    };

    match args.get(1).map(String::as_str) {
        Some("generate") => generate(&config, flag(&args, "--out").unwrap_or(".")),
        Some("demo") => {
            let seed = parse_arg(&args, "--seed", 42u64);
            let name = flag(&args, "--name").unwrap_or("demo");
            let config = PersistConfig {
                id_seed: Some(seed),
                ..config
            };
            let store = open_store(&args, &config)?;
            demo(config, store, name)
        }
        Some("list") => list(&config, open_store(&args, &config)?),
        Some("inspect") => {
            let name = required(&args, "--name")?;
            inspect(config.clone(), open_store(&args, &config)?, name)
        }
        Some("delete") => {
            let name = required(&args, "--name")?;
            let store = open_store(&args, &config)?;
            if store.delete(name)? {
                println!("Deleted '{name}'");
            } else {
                println!("No save named '{name}'");
            }
            Ok(())
        }
        Some(other) => bail!("Unknown command '{other}' (generate, demo, list, inspect, delete)"),
        None => bail!("Usage: persistor <generate|demo|list|inspect|delete> [flags]"),
    }
}

fn generate(config: &PersistConfig, out: &str) -> Result<()> {
    let adaptors = sample::adaptors();
    let mut catalog = sample::catalog();
    let report = catalog.generate(&adaptors);

    log::info!("Rendering generated source under {out}");
    for file in catalog.render_all(config, &adaptors) {
        let path = Path::new(out).join(&file.path);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, &file.contents)?;
        println!("  wrote {}", path.display());
    }

    println!("=== GENERATION ===");
    println!("  generated: {}", report.generated.join(", "));
    println!("  ignored:   {}", report.ignored.join(", "));
    for (type_name, err) in &report.failed {
        println!("  FAILED {type_name}: {err}");
    }
    if !report.is_clean() {
        bail!("{} type(s) failed generation", report.failed.len());
    }
    Ok(())
}

/// Build a small squad, save it, damage it in memory, load it back, and
/// show that the saved state came back.
fn demo(config: PersistConfig, store: Box<dyn DocumentStore>, name: &str) -> Result<()> {
    let mut engine = PersistEngine::new(config, sample::catalog(), sample::adaptors(), store);
    let mut scene = sample::scene();
    let world = scene.add_anchor("World", None)?;

    let veteran = Preset::new("Enemy").with("name", "Veteran").with("health", 150);
    let squad = engine.spawn(
        &mut scene,
        "Squad",
        SpawnOptions {
            name: Some("Bravo Team"),
            ..SpawnOptions::default()
        },
    )?;
    let leader = engine.spawn(
        &mut scene,
        "Enemy",
        SpawnOptions {
            preset: Some(&veteran),
            ..SpawnOptions::default()
        },
    )?;
    let grunt = engine.spawn(&mut scene, "Enemy", SpawnOptions::default())?;
    scene.set_parent(squad.node(), Some(world), 0)?;
    scene.set_parent(leader.node(), Some(squad.node()), 0)?;
    scene.set_parent(grunt.node(), Some(squad.node()), 1)?;

    grunt.with_mut(|e: &mut Enemy| {
        e.target = Link::to(&leader);
        e.position = Vec3::new(4.0, 0.0, -2.5);
        e.tags = vec!["flanker".to_string()];
    });
    squad.with_mut(|s: &mut Squad| {
        s.callsign = "Bravo".to_string();
        s.morale = 0.8;
        s.leader = Link::to(&leader);
        s.members = vec![Link::to(&leader), Link::to(&grunt)];
    });

    let saved = engine.save(&scene, name)?;
    println!("=== SAVE '{name}' ===");
    println!("  records:  {}", saved.written);
    println!("  untyped:  {:?}", saved.skipped_types);
    println!("  skipped:  {}", saved.skipped.len());

    let grunt_id = grunt.identity();
    grunt.with_mut(|e: &mut Enemy| e.health = 5);
    drop((squad, leader, grunt));

    let loaded = engine.load(&mut scene, name)?;
    println!("=== LOAD '{name}' ===");
    println!("  instantiated: {}", loaded.instantiated);
    println!("  destroyed:    {}", loaded.destroyed);
    println!("  skipped:      {}", loaded.skipped.len());
    println!("  dangling:     {}", loaded.dangling.len());

    let Some(grunt) = engine.resolve::<Enemy>(&grunt_id) else {
        bail!("'{grunt_id}' did not come back");
    };
    print_enemy(&grunt);
    if let Some(squad) = engine.registry().live().into_iter().find(|h| h.type_name() == "Squad") {
        println!("  squad node: {}", scene.name_of(squad.node()).unwrap_or("-"));
    }
    Ok(())
}

fn print_enemy(handle: &Handle) {
    handle.with(|e: &Enemy| {
        println!("  {} '{}'", e.id, e.name);
        println!("    health:   {}", e.health);
        println!("    position: ({}, {}, {})", e.position.x, e.position.y, e.position.z);
        println!("    target:   {}", e.target.identity().unwrap_or_else(|| "-".to_string()));
    });
}

fn list(config: &PersistConfig, store: Box<dyn DocumentStore>) -> Result<()> {
    let saves = store.list()?;
    if saves.is_empty() {
        println!("  (no saves)");
    }
    for save in saves {
        println!(
            "  {:<24} {}  {:>8} bytes  ({})",
            save.name,
            save.saved_at.format("%Y-%m-%d %H:%M:%S"),
            save.bytes,
            config.save_file_name(&save.name)
        );
    }
    Ok(())
}

fn inspect(config: PersistConfig, store: Box<dyn DocumentStore>, name: &str) -> Result<()> {
    let engine = PersistEngine::new(config, sample::catalog(), sample::adaptors(), store);
    for (type_name, mirror) in engine.read_mirrors(name)? {
        let record = InspectedRecord {
            type_name: &type_name,
            mirror:    &mirror,
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

fn open_store(args: &[String], config: &PersistConfig) -> Result<Box<dyn DocumentStore>> {
    if let Some(dir) = flag(args, "--dir") {
        return Ok(Box::new(FileStore::new(dir, config.clone())));
    }
    let db = flag(args, "--db").unwrap_or("persistor.db");
    Ok(Box::new(SqliteStore::open(db)?))
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == name).map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    match flag(args, name) {
        Some(value) => Ok(value),
        None => bail!("Missing required flag {name}"),
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
