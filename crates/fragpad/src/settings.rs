use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use codestore::UserIdentity;
use padconfig::PadConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::paths::AppPaths;

const DEFAULT_NICKNAME: &str = "anonymous";

/// Loads the configuration from `explicit` or the default location.
///
/// A missing default file yields the built-in defaults; a missing explicit
/// file is an error.
pub fn load_config(paths: &AppPaths, explicit: Option<&Path>) -> Result<PadConfig> {
    let default_path = paths.config_file();
    let path = explicit.unwrap_or(default_path.as_path());
    if explicit.is_none() && !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(PadConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config = PadConfig::from_toml_str(&contents)
        .with_context(|| format!("invalid config file at {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Small amount of state kept between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub identity: Option<UserIdentity>,
}

impl AppState {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read state file at {}", path.display()))?;
            let state: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse state file at {}", path.display()))?;
            Ok(state)
        } else {
            Ok(Self::default())
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("state path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!(
                "failed to prepare directory for state file at {}",
                dir.display()
            )
        })?;
        let serialized =
            toml::to_string_pretty(self).context("failed to serialize state file to TOML")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write state file to {}", path.display()))?;
        Ok(())
    }

    /// Returns the stored identity, minting one on first use.
    ///
    /// Asking for a different nickname keeps the id and renames the identity.
    /// Returns whether the state changed and needs persisting.
    pub fn identity(&mut self, nickname: Option<&str>) -> (UserIdentity, bool) {
        let nickname = nickname.map(str::trim).filter(|name| !name.is_empty());
        match &mut self.identity {
            Some(identity) => match nickname {
                Some(name) if name != identity.nickname => {
                    identity.nickname = name.to_string();
                    (identity.clone(), true)
                }
                _ => (identity.clone(), false),
            },
            None => {
                let identity = UserIdentity::generate(nickname.unwrap_or(DEFAULT_NICKNAME));
                info!(%identity, "created user identity");
                self.identity = Some(identity.clone());
                (identity, true)
            }
        }
    }
}
