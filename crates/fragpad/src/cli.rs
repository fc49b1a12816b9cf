use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use playground::ValuePersistence;

#[derive(Parser, Debug)]
#[command(
    name = "fragpad",
    author,
    version,
    about = "Live GLSL fragment shader playground",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Configuration file to use instead of the one in the config directory.
    #[arg(long, global = true, env = "FRAGPAD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Shader file to watch; every saved edit is recompiled live.
    #[arg(value_name = "FILE")]
    pub shader: Option<PathBuf>,

    /// Start from the draft cached by the previous session.
    #[arg(long)]
    pub restore_draft: bool,

    /// Quiet period after an edit before recompiling (e.g. `300ms`, `1s`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub debounce: Option<Duration>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Uniform values on recompile: `carry-forward` or `reset`.
    #[arg(long, value_name = "POLICY", value_parser = parse_persistence)]
    pub persistence: Option<ValuePersistence>,

    /// File or named pipe of raw 512-byte frames bound to `iChannel0`.
    #[arg(long, value_name = "PATH")]
    pub samples: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the shader source exactly as it is handed to the GL driver.
    Synth(SynthArgs),
    /// Save, load or list shaders on the remote code store.
    Remote(RemoteCommand),
    /// Save, load or list named snapshots on this machine.
    Snapshot(SnapshotCommand),
    /// Inspect or create the configuration file.
    Config(ConfigCommand),
    /// Print resolved directories for config, data and cache.
    Where,
}

#[derive(Parser, Debug)]
pub struct SynthArgs {
    /// Shader source to synthesize.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Emit the full synthesis report as JSON.
    #[arg(long, conflicts_with = "uniforms")]
    pub json: bool,

    /// List registered uniforms instead of printing the source.
    #[arg(long)]
    pub uniforms: bool,
}

#[derive(Parser, Debug)]
pub struct RemoteCommand {
    /// Nickname used to key saved code; defaults to `remote.user`.
    #[arg(long, env = "FRAGPAD_USER", value_name = "NICKNAME")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Parser, Debug)]
pub struct SnapshotCommand {
    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// Save a shader under NAME (the cached draft when FILE is omitted).
    Save {
        name: String,
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Load the shader saved under NAME.
    Load {
        name: String,
        /// Write to this file instead of stdout.
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List saved shader names.
    List,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed)
        .map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_persistence(value: &str) -> Result<ValuePersistence, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "carry-forward" | "carry" | "keep" => Ok(ValuePersistence::CarryForward),
        "reset" => Ok(ValuePersistence::Reset),
        other => Err(format!(
            "unknown persistence '{other}'; expected carry-forward or reset"
        )),
    }
}
