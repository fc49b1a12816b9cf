use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use codestore::DraftCache;
use crossbeam_channel::unbounded;
use padconfig::PadConfig;
use playground::{
    BufferSource, ChannelSampleSource, ChannelTextSource, NoSamples, SampleSource, SessionOptions,
    TextSource, STARTER_SHADER,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::controls;
use crate::paths::AppPaths;
use crate::samples::{self, SAMPLE_FRAME_BYTES};
use crate::settings;
use crate::watch::FileWatcher;
use crate::window::{self, Inputs, WindowOptions};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    paths.ensure()?;
    let config = settings::load_config(&paths, config_path)?;

    let drafts = DraftCache::new(paths.draft_file());
    let initial = initial_text(&args, &drafts)?;

    let (text, _watcher): (Box<dyn TextSource>, Option<FileWatcher>) = match &args.shader {
        Some(path) => {
            let (tx, rx) = unbounded();
            let watcher = FileWatcher::spawn(path.clone(), config.editor.poll_interval, tx)?;
            info!(path = %path.display(), "watching shader file");
            (Box::new(ChannelTextSource::new(initial, rx)), Some(watcher))
        }
        None => (Box::new(BufferSource::new(initial)), None),
    };

    let samples: Box<dyn SampleSource> = match &args.samples {
        Some(path) => {
            let (tx, rx) = unbounded();
            samples::spawn_sample_reader(path.clone(), SAMPLE_FRAME_BYTES, tx)?;
            info!(path = %path.display(), "reading sample frames");
            Box::new(ChannelSampleSource::new(rx))
        }
        None => Box::new(NoSamples),
    };

    let (control_tx, control_rx) = unbounded();
    controls::spawn_stdin_reader(control_tx)?;

    let session_options = session_options(&config, &args);
    let window_options = WindowOptions {
        title: window_title(&config, &args),
        vsync: config.window.vsync,
    };
    let drafts = config.editor.cache_drafts.then_some(drafts);

    let inputs = Inputs {
        text,
        samples,
        controls: control_rx,
    };
    window::run_window(window_options, session_options, inputs, drafts)
}

/// Command-line overrides on top of the configuration.
pub fn session_options(config: &PadConfig, args: &RunArgs) -> SessionOptions {
    let (width, height) = args
        .size
        .unwrap_or((config.window.width, config.window.height));
    SessionOptions {
        debounce: args.debounce.unwrap_or(config.editor.debounce),
        ranges: config.controls,
        persistence: args.persistence.unwrap_or(config.editor.persistence),
        width,
        height,
        presets: config.presets(),
    }
}

fn window_title(config: &PadConfig, args: &RunArgs) -> String {
    match args.shader.as_ref().and_then(|path| path.file_name()) {
        Some(name) => format!("{} - {}", config.window.title, name.to_string_lossy()),
        None => config.window.title.clone(),
    }
}

/// Picks the text the session starts from.
///
/// A shader path that does not exist yet is created from the starter shader
/// so the watcher has something to follow.
fn initial_text(args: &RunArgs, drafts: &DraftCache) -> Result<String> {
    if args.restore_draft {
        match drafts.restore()? {
            Some(text) => {
                info!(path = %drafts.path().display(), "restored cached draft");
                return Ok(text);
            }
            None => warn!("no cached draft to restore"),
        }
    }

    let Some(path) = &args.shader else {
        return Ok(String::new());
    };
    if !path.exists() {
        fs::write(path, STARTER_SHADER)
            .with_context(|| format!("failed to create shader file at {}", path.display()))?;
        info!(path = %path.display(), "created shader file from the starter shader");
        return Ok(STARTER_SHADER.to_string());
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read shader file at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground::ValuePersistence;
    use std::time::Duration;
    use tempfile::TempDir;

    fn args() -> RunArgs {
        RunArgs {
            shader: None,
            restore_draft: false,
            debounce: None,
            size: None,
            persistence: None,
            samples: None,
        }
    }

    #[test]
    fn command_line_overrides_config() {
        let mut config = PadConfig::default();
        config.editor.debounce = Duration::from_millis(500);
        config.window.width = 640;
        config.window.height = 360;

        let options = session_options(&config, &args());
        assert_eq!(options.debounce, Duration::from_millis(500));
        assert_eq!((options.width, options.height), (640, 360));
        assert_eq!(options.persistence, ValuePersistence::CarryForward);

        let overridden = RunArgs {
            debounce: Some(Duration::from_millis(50)),
            size: Some((100, 50)),
            persistence: Some(ValuePersistence::Reset),
            ..args()
        };
        let options = session_options(&config, &overridden);
        assert_eq!(options.debounce, Duration::from_millis(50));
        assert_eq!((options.width, options.height), (100, 50));
        assert_eq!(options.persistence, ValuePersistence::Reset);
    }

    #[test]
    fn initial_text_prefers_draft_then_file() {
        let dir = TempDir::new().unwrap();
        let drafts = DraftCache::new(dir.path().join("draft.frag"));
        let shader = dir.path().join("demo.frag");

        assert_eq!(initial_text(&args(), &drafts).unwrap(), "");

        let with_file = RunArgs {
            shader: Some(shader.clone()),
            ..args()
        };
        assert_eq!(initial_text(&with_file, &drafts).unwrap(), STARTER_SHADER);
        assert_eq!(fs::read_to_string(&shader).unwrap(), STARTER_SHADER);

        fs::write(&shader, "void main() {}").unwrap();
        assert_eq!(initial_text(&with_file, &drafts).unwrap(), "void main() {}");

        let restoring = RunArgs {
            restore_draft: true,
            ..with_file
        };
        assert_eq!(initial_text(&restoring, &drafts).unwrap(), "void main() {}");
        drafts.store("// draft").unwrap();
        assert_eq!(initial_text(&restoring, &drafts).unwrap(), "// draft");
    }

    #[test]
    fn title_names_the_shader_file() {
        let config = PadConfig::default();
        assert_eq!(window_title(&config, &args()), "fragpad");
        let with_file = RunArgs {
            shader: Some("shaders/waves.frag".into()),
            ..args()
        };
        assert_eq!(window_title(&config, &with_file), "fragpad - waves.frag");
    }
}
