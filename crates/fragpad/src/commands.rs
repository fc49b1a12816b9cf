use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use codestore::{CodeKey, CodeStore, DraftCache, HttpCodeStore, SnapshotStore, UserIdentity};
use padconfig::PadConfig;
use playground::{RegexSynthesizer, SourceSynthesizer, UniformRegistry};

use crate::cli::{ConfigAction, RemoteCommand, SnapshotCommand, StoreAction, SynthArgs};
use crate::paths::AppPaths;
use crate::settings::{self, AppState};

pub fn synth(args: SynthArgs, config_path: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = settings::load_config(&paths, config_path)?;
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read shader file at {}", args.file.display()))?;

    let synthesis = RegexSynthesizer::new()
        .with_presets(config.presets())
        .synthesize(&source);
    for anomaly in &synthesis.anomalies {
        eprintln!("warning: {anomaly}");
    }

    let mut stdout = io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &synthesis)
            .context("failed to serialise synthesis report")?;
        writeln!(stdout)?;
    } else if args.uniforms {
        let mut registry = UniformRegistry::new(config.controls, config.editor.persistence);
        registry.repopulate(synthesis.uniforms.iter().cloned());
        if registry.is_empty() {
            writeln!(stdout, "No user uniforms declared.")?;
        }
        for declaration in registry.iter() {
            writeln!(
                stdout,
                "  {:<20} {:<6} {:<12} {}",
                declaration.name,
                declaration.glsl_type.keyword(),
                declaration.ui_option.to_string(),
                declaration.current_value
            )?;
        }
    } else {
        stdout.write_all(synthesis.final_source.as_bytes())?;
    }
    Ok(())
}

pub fn remote(command: RemoteCommand, config_path: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = settings::load_config(&paths, config_path)?;
    let Some(endpoint) = config.remote.endpoint.as_deref() else {
        bail!(
            "no remote endpoint configured; set `remote.endpoint` in {}",
            config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| paths.config_file())
                .display()
        );
    };
    let store = HttpCodeStore::new(endpoint, config.remote.timeout)?;
    let nickname = command.user.as_deref().or(config.remote.user.as_deref());
    let identity = identity(&paths, nickname)?;
    run_store_action(&store, &identity, command.action, &paths)
}

pub fn snapshot(command: SnapshotCommand) -> Result<()> {
    let paths = AppPaths::discover()?;
    let store = SnapshotStore::new(paths.snapshot_dir());
    let identity = identity(&paths, None)?;
    run_store_action(&store, &identity, command.action, &paths)
}

fn identity(paths: &AppPaths, nickname: Option<&str>) -> Result<UserIdentity> {
    let state_file = paths.state_file();
    let mut state = AppState::load_or_default(&state_file)?;
    let (identity, changed) = state.identity(nickname);
    if changed {
        state.persist(&state_file)?;
    }
    Ok(identity)
}

fn run_store_action(
    store: &dyn CodeStore,
    identity: &UserIdentity,
    action: StoreAction,
    paths: &AppPaths,
) -> Result<()> {
    match action {
        StoreAction::Save { name, file } => {
            let key = CodeKey::new(identity.clone(), &name)?;
            let source = match &file {
                Some(file) => fs::read_to_string(file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                None => DraftCache::new(paths.draft_file())
                    .restore()?
                    .context("no cached draft to save; pass a FILE")?,
            };
            store.save(&key, &source)?;
            println!("Saved '{}' for {identity}", key.name);
        }
        StoreAction::Load { name, output } => {
            let key = CodeKey::new(identity.clone(), &name)?;
            let source = store.load(&key)?;
            match output {
                Some(path) => {
                    fs::write(&path, &source)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Loaded '{}' into {}", key.name, path.display());
                }
                None => io::stdout().lock().write_all(source.as_bytes())?,
            }
        }
        StoreAction::List => {
            let names = store.list(identity)?;
            if names.is_empty() {
                println!("No saved shaders for {identity}.");
            }
            for name in names {
                println!("  {name}");
            }
        }
    }
    Ok(())
}

pub fn config(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    match action {
        ConfigAction::Show => {
            let config = settings::load_config(&paths, config_path)?;
            print!("{}", config.to_toml_string()?);
        }
        ConfigAction::Init { force } => {
            let target = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| paths.config_file());
            if target.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    target.display()
                );
            }
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            fs::write(&target, PadConfig::default().to_toml_string()?)
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("Wrote default configuration to {}", target.display());
        }
    }
    Ok(())
}

pub fn where_(config_path: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let state = AppState::load_or_default(&paths.state_file())?;
    println!("Configuration directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  data:       {}", paths.data_dir().display());
    println!("  cache:      {}", paths.cache_dir().display());
    match config_path {
        Some(path) => println!("  config file: {} (override)", path.display()),
        None => println!("  config file: {}", paths.config_file().display()),
    }
    println!("  state:      {}", paths.state_file().display());
    println!("  draft:      {}", paths.draft_file().display());
    println!("  snapshots:  {}", paths.snapshot_dir().display());
    if let Some(identity) = &state.identity {
        println!("Identity: {identity}");
    }
    Ok(())
}
