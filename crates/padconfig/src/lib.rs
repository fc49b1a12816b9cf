use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use playground::{
    ControlRanges, GlslType, UiOption, UniformDeclaration, UniformValue, ValuePersistence,
    BUILTIN_UNIFORMS,
};
use serde::de::{self, Deserializer};
use serde::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PadConfig {
    pub version: u32,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub controls: ControlRanges,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformPreset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorConfig {
    #[serde(
        default = "default_debounce",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub debounce: Duration,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,
    #[serde(default)]
    pub persistence: ValuePersistence,
    /// Cache every accepted edit so it can be restored later.
    #[serde(default = "default_true")]
    pub cache_drafts: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_true")]
    pub vsync: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

/// A uniform declared on behalf of every shader that does not declare it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UniformPreset {
    #[serde(rename = "type")]
    pub glsl_type: GlslType,
    #[serde(default)]
    pub option: UiOption,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<UniformValue>,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            version: 1,
            editor: EditorConfig::default(),
            controls: ControlRanges::default(),
            window: WindowConfig::default(),
            remote: RemoteConfig::default(),
            uniforms: BTreeMap::new(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            poll_interval: default_poll_interval(),
            persistence: ValuePersistence::default(),
            cache_drafts: true,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            vsync: true,
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_millis(300)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_width() -> u32 {
    960
}

fn default_height() -> u32 {
    540
}

fn default_title() -> String {
    "fragpad".to_string()
}

fn default_true() -> bool {
    true
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn serialize_duration_opt<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serialize_duration(duration, serializer),
        None => serializer.serialize_none(),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer)?
        .ok_or_else(|| de::Error::custom("duration may not be empty"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl PadConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PadConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Preset uniforms as declarations, initialised to their configured value.
    pub fn presets(&self) -> Vec<UniformDeclaration> {
        self.uniforms
            .iter()
            .map(|(name, preset)| {
                let mut declaration = UniformDeclaration::new(name, preset.glsl_type, preset.option);
                if let Some(value) = preset
                    .value
                    .clone()
                    .and_then(|value| preset.glsl_type.coerce(value))
                {
                    declaration.current_value = value;
                }
                declaration
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.editor.debounce > Duration::from_secs(10) {
            return Err(ConfigError::Invalid(
                "editor.debounce must be at most 10s".into(),
            ));
        }

        if self.editor.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "editor.poll_interval must be greater than zero".into(),
            ));
        }

        let controls = &self.controls;
        if !(controls.slider_min < controls.slider_max) {
            return Err(ConfigError::Invalid(
                "controls.slider_min must be less than controls.slider_max".into(),
            ));
        }
        if !(controls.slider_step > 0.0) {
            return Err(ConfigError::Invalid(
                "controls.slider_step must be greater than zero".into(),
            ));
        }
        if !(controls.controller_min < controls.controller_max) {
            return Err(ConfigError::Invalid(
                "controls.controller_min must be less than controls.controller_max".into(),
            ));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window.width and window.height must be greater than zero".into(),
            ));
        }

        if let Some(endpoint) = &self.remote.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "remote.endpoint '{endpoint}' must be an http or https URL"
                )));
            }
        }

        if let Some(user) = &self.remote.user {
            if user.trim().is_empty() {
                return Err(ConfigError::Invalid("remote.user may not be empty".into()));
            }
        }

        for (name, preset) in &self.uniforms {
            validate_uniform_name(name)?;
            if let Some(value) = &preset.value {
                if preset.glsl_type.coerce(value.clone()).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "uniform '{name}' is declared {} but its value is a {}",
                        preset.glsl_type,
                        value.shape()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_uniform_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(ConfigError::Invalid(format!(
            "uniform name '{name}' is not a valid GLSL identifier"
        )));
    }
    if BUILTIN_UNIFORMS.contains(&name) {
        return Err(ConfigError::Invalid(format!(
            "uniform '{name}' shadows a built-in uniform"
        )));
    }
    Ok(())
}
