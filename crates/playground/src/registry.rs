use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::types::{GlslType, UiOption, UniformDeclaration, UniformValue};

/// Errors raised when a caller pushes a value into the registry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UniformError {
    #[error("unknown uniform `{0}`")]
    Unknown(String),
    #[error("uniform `{name}` is declared as {expected}, got a {found} value")]
    TypeMismatch {
        name: String,
        expected: GlslType,
        found: &'static str,
    },
    #[error("uniform `{name}` cannot take a non-finite value")]
    NonFinite { name: String },
}

/// What happens to live values when the source is recompiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValuePersistence {
    /// Every recompilation starts from zero defaults.
    Reset,
    /// Uniforms whose name and type survive keep their value.
    #[default]
    CarryForward,
}

/// Value ranges enforced by the UI control contracts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRanges {
    pub slider_min: f32,
    pub slider_max: f32,
    pub slider_step: f32,
    pub controller_min: f32,
    pub controller_max: f32,
}

impl Default for ControlRanges {
    fn default() -> Self {
        Self {
            slider_min: -10.0,
            slider_max: 10.0,
            slider_step: 0.01,
            controller_min: -1.0,
            controller_max: 1.0,
        }
    }
}

/// Description of the control a front end should present for a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "camelCase")]
pub enum ControlSpec {
    Slider { min: f32, max: f32, step: f32 },
    Color { components: usize },
    Pad { dimensions: usize, min: f32, max: f32 },
    Input { glsl_type: GlslType },
}

/// Declared uniforms and their live values, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct UniformRegistry {
    entries: Vec<UniformDeclaration>,
    index: HashMap<String, usize>,
    carried: HashMap<String, UniformValue>,
    ranges: ControlRanges,
    persistence: ValuePersistence,
    dirty: bool,
}

impl UniformRegistry {
    pub fn new(ranges: ControlRanges, persistence: ValuePersistence) -> Self {
        Self {
            ranges,
            persistence,
            ..Self::default()
        }
    }

    pub fn ranges(&self) -> ControlRanges {
        self.ranges
    }

    pub fn persistence(&self) -> ValuePersistence {
        self.persistence
    }

    /// Drops every declaration and any values stashed for carry-forward.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.carried.clear();
        self.dirty = true;
    }

    /// Starts a repopulation pass: current values are stashed so matching
    /// registrations can pick them up, then the registry is emptied.
    pub fn begin_pass(&mut self) {
        let carried = match self.persistence {
            ValuePersistence::Reset => HashMap::new(),
            ValuePersistence::CarryForward => self
                .entries
                .drain(..)
                .map(|entry| (entry.name, entry.current_value))
                .collect(),
        };
        self.reset();
        self.carried = carried;
    }

    /// Registers a declaration. Returns `false` if the name is already known,
    /// in which case the first declaration is kept.
    pub fn register(&mut self, mut declaration: UniformDeclaration) -> bool {
        if self.index.contains_key(&declaration.name) {
            trace!(name = %declaration.name, "ignoring duplicate uniform declaration");
            return false;
        }
        if let Some(previous) = self.carried.remove(&declaration.name) {
            if let Some(value) = declaration.glsl_type.coerce(previous) {
                declaration.current_value = value;
            }
        }
        let option = declaration.ui_option.effective_for(declaration.glsl_type);
        declaration.current_value =
            constrain(&self.ranges, option, declaration.current_value);
        self.index
            .insert(declaration.name.clone(), self.entries.len());
        self.entries.push(declaration);
        self.dirty = true;
        true
    }

    /// Replaces the registry contents with `declarations`, honouring the
    /// persistence policy.
    pub fn repopulate<I>(&mut self, declarations: I)
    where
        I: IntoIterator<Item = UniformDeclaration>,
    {
        self.begin_pass();
        for declaration in declarations {
            self.register(declaration);
        }
        self.carried.clear();
        debug!(count = self.entries.len(), "uniform registry repopulated");
    }

    pub fn get(&self, name: &str) -> Option<&UniformDeclaration> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    pub fn value(&self, name: &str) -> Option<&UniformValue> {
        self.get(name).map(|entry| &entry.current_value)
    }

    /// Updates a live value after validating its shape and clamping it to the
    /// uniform's control range.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?;
        let entry = &mut self.entries[slot];

        let found = value.shape();
        let value = entry
            .glsl_type
            .coerce(value)
            .ok_or_else(|| UniformError::TypeMismatch {
                name: name.to_string(),
                expected: entry.glsl_type,
                found,
            })?;
        if !is_finite(&value) {
            return Err(UniformError::NonFinite {
                name: name.to_string(),
            });
        }

        let option = entry.ui_option.effective_for(entry.glsl_type);
        entry.current_value = constrain(&self.ranges, option, value);
        self.dirty = true;
        Ok(())
    }

    /// Control a front end should render for `name`.
    pub fn control_for(&self, name: &str) -> Option<ControlSpec> {
        let entry = self.get(name)?;
        let ranges = &self.ranges;
        Some(match entry.ui_option.effective_for(entry.glsl_type) {
            UiOption::Slider => ControlSpec::Slider {
                min: ranges.slider_min,
                max: ranges.slider_max,
                step: ranges.slider_step,
            },
            UiOption::ColorPicker => ControlSpec::Color {
                components: entry.glsl_type.arity(),
            },
            UiOption::Controller2d | UiOption::Controller3d => ControlSpec::Pad {
                dimensions: entry.glsl_type.arity(),
                min: ranges.controller_min,
                max: ranges.controller_max,
            },
            UiOption::Default => ControlSpec::Input {
                glsl_type: entry.glsl_type,
            },
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformDeclaration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name to value map of every registered uniform.
    pub fn snapshot(&self) -> BTreeMap<String, UniformValue> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.current_value.clone()))
            .collect()
    }

    /// Returns whether values changed since the last call and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

fn is_finite(value: &UniformValue) -> bool {
    match value {
        UniformValue::Float(v) => v.is_finite(),
        UniformValue::Vector(values) => values.iter().all(|v| v.is_finite()),
        UniformValue::Int(_) | UniformValue::Bool(_) => true,
    }
}

fn constrain(ranges: &ControlRanges, option: UiOption, value: UniformValue) -> UniformValue {
    let (min, max) = match option {
        UiOption::Slider => (ranges.slider_min, ranges.slider_max),
        UiOption::ColorPicker => (0.0, 1.0),
        UiOption::Controller2d | UiOption::Controller3d => {
            (ranges.controller_min, ranges.controller_max)
        }
        UiOption::Default => return value,
    };
    match value {
        UniformValue::Float(v) => UniformValue::Float(v.clamp(min, max)),
        UniformValue::Vector(values) => {
            UniformValue::Vector(values.into_iter().map(|v| v.clamp(min, max)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(declarations: Vec<UniformDeclaration>) -> UniformRegistry {
        let mut registry = UniformRegistry::default();
        registry.repopulate(declarations);
        registry
    }

    #[test]
    fn set_then_get_round_trips_in_range_values() {
        let mut registry = registry_with(vec![
            UniformDeclaration::new("u_speed", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_offset", GlslType::Vec2, UiOption::Default),
            UniformDeclaration::new("u_count", GlslType::Int, UiOption::Default),
            UniformDeclaration::new("u_on", GlslType::Bool, UiOption::Default),
        ]);
        registry.set("u_speed", UniformValue::Float(2.5)).unwrap();
        registry
            .set("u_offset", UniformValue::Vector(vec![0.1, -3.0]))
            .unwrap();
        registry.set("u_count", UniformValue::Int(7)).unwrap();
        registry.set("u_on", UniformValue::Bool(true)).unwrap();

        assert_eq!(registry.value("u_speed"), Some(&UniformValue::Float(2.5)));
        assert_eq!(
            registry.value("u_offset"),
            Some(&UniformValue::Vector(vec![0.1, -3.0]))
        );
        assert_eq!(registry.value("u_count"), Some(&UniformValue::Int(7)));
        assert_eq!(registry.value("u_on"), Some(&UniformValue::Bool(true)));
    }

    #[test]
    fn set_clamps_to_control_contract() {
        let mut registry = registry_with(vec![
            UniformDeclaration::new("u_speed", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_tint", GlslType::Vec3, UiOption::ColorPicker),
            UniformDeclaration::new("u_pad", GlslType::Vec2, UiOption::Controller2d),
        ]);
        registry.set("u_speed", UniformValue::Float(42.0)).unwrap();
        registry
            .set("u_tint", UniformValue::Vector(vec![1.5, 0.5, -0.2]))
            .unwrap();
        registry
            .set("u_pad", UniformValue::Vector(vec![-4.0, 0.25]))
            .unwrap();

        assert_eq!(registry.value("u_speed"), Some(&UniformValue::Float(10.0)));
        assert_eq!(
            registry.value("u_tint"),
            Some(&UniformValue::Vector(vec![1.0, 0.5, 0.0]))
        );
        assert_eq!(
            registry.value("u_pad"),
            Some(&UniformValue::Vector(vec![-1.0, 0.25]))
        );
    }

    #[test]
    fn set_rejects_unknown_names_and_wrong_shapes() {
        let mut registry = registry_with(vec![UniformDeclaration::new(
            "u_pos",
            GlslType::Vec3,
            UiOption::Default,
        )]);
        assert_eq!(
            registry.set("u_missing", UniformValue::Float(1.0)),
            Err(UniformError::Unknown("u_missing".into()))
        );
        assert!(matches!(
            registry.set("u_pos", UniformValue::Vector(vec![1.0, 2.0])),
            Err(UniformError::TypeMismatch { found: "vec2", .. })
        ));
        assert!(matches!(
            registry.set("u_pos", UniformValue::Vector(vec![f32::NAN, 0.0, 0.0])),
            Err(UniformError::NonFinite { .. })
        ));
    }

    #[test]
    fn carry_forward_keeps_matching_values() {
        let mut registry = registry_with(vec![
            UniformDeclaration::new("u_a", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_b", GlslType::Float, UiOption::Slider),
        ]);
        registry.set("u_a", UniformValue::Float(3.0)).unwrap();
        registry.set("u_b", UniformValue::Float(4.0)).unwrap();

        registry.repopulate(vec![
            UniformDeclaration::new("u_a", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_b", GlslType::Vec2, UiOption::Default),
        ]);
        assert_eq!(registry.value("u_a"), Some(&UniformValue::Float(3.0)));
        assert_eq!(
            registry.value("u_b"),
            Some(&UniformValue::Vector(vec![0.0, 0.0]))
        );
    }

    #[test]
    fn reset_policy_starts_from_defaults() {
        let mut registry = UniformRegistry::new(ControlRanges::default(), ValuePersistence::Reset);
        registry.repopulate(vec![UniformDeclaration::new(
            "u_a",
            GlslType::Float,
            UiOption::Default,
        )]);
        registry.set("u_a", UniformValue::Float(3.0)).unwrap();
        registry.repopulate(vec![UniformDeclaration::new(
            "u_a",
            GlslType::Float,
            UiOption::Default,
        )]);
        assert_eq!(registry.value("u_a"), Some(&UniformValue::Float(0.0)));
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = UniformRegistry::default();
        assert!(registry.register(UniformDeclaration::new("u_a", GlslType::Float, UiOption::Default)));
        assert!(!registry.register(UniformDeclaration::new("u_a", GlslType::Vec4, UiOption::Default)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("u_a").map(|u| u.glsl_type), Some(GlslType::Float));
    }

    #[test]
    fn control_specs_follow_effective_option() {
        let registry = registry_with(vec![
            UniformDeclaration::new("u_speed", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_bad", GlslType::Float, UiOption::ColorPicker),
            UniformDeclaration::new("u_pad", GlslType::Vec3, UiOption::Controller3d),
        ]);
        assert_eq!(
            registry.control_for("u_speed"),
            Some(ControlSpec::Slider {
                min: -10.0,
                max: 10.0,
                step: 0.01
            })
        );
        assert_eq!(
            registry.control_for("u_bad"),
            Some(ControlSpec::Input {
                glsl_type: GlslType::Float
            })
        );
        assert_eq!(
            registry.control_for("u_pad"),
            Some(ControlSpec::Pad {
                dimensions: 3,
                min: -1.0,
                max: 1.0
            })
        );
    }

    #[test]
    fn dirty_flag_is_consumed_once() {
        let mut registry = registry_with(vec![UniformDeclaration::new(
            "u_a",
            GlslType::Float,
            UiOption::Default,
        )]);
        assert!(registry.take_dirty());
        assert!(!registry.take_dirty());
        registry.set("u_a", UniformValue::Float(1.0)).unwrap();
        assert!(registry.take_dirty());
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let registry = registry_with(vec![
            UniformDeclaration::new("u_z", GlslType::Float, UiOption::Default),
            UniformDeclaration::new("u_a", GlslType::Int, UiOption::Default),
        ]);
        let names: Vec<_> = registry.snapshot().into_keys().collect();
        assert_eq!(names, ["u_a", "u_z"]);
    }
}
