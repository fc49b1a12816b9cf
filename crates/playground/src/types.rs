use std::fmt;

use serde::{Deserialize, Serialize};

/// GLSL types the playground recognises in `uniform` declarations.
///
/// Anything outside this set (matrices, samplers, arrays) is left to the
/// compiler and never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    Bool,
}

impl GlslType {
    /// Parses a GLSL type keyword, returning `None` for unsupported types.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "float" => Some(Self::Float),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }

    /// Number of scalar components carried by a value of this type.
    pub fn arity(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Bool => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
        }
    }

    /// Zero value of the matching arity.
    pub fn default_value(self) -> UniformValue {
        match self {
            Self::Float => UniformValue::Float(0.0),
            Self::Int => UniformValue::Int(0),
            Self::Bool => UniformValue::Bool(false),
            Self::Vec2 | Self::Vec3 | Self::Vec4 => UniformValue::Vector(vec![0.0; self.arity()]),
        }
    }

    /// Converts `value` into the shape this type expects, if it is compatible.
    ///
    /// Integers widen into floats; vectors must match the exact arity.
    pub fn coerce(self, value: UniformValue) -> Option<UniformValue> {
        match (self, value) {
            (Self::Float, UniformValue::Float(v)) => Some(UniformValue::Float(v)),
            (Self::Float, UniformValue::Int(v)) => Some(UniformValue::Float(v as f32)),
            (Self::Int, UniformValue::Int(v)) => Some(UniformValue::Int(v)),
            (Self::Bool, UniformValue::Bool(v)) => Some(UniformValue::Bool(v)),
            (Self::Vec2 | Self::Vec3 | Self::Vec4, UniformValue::Vector(values))
                if values.len() == self.arity() =>
            {
                Some(UniformValue::Vector(values))
            }
            _ => None,
        }
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Live value of a uniform.
///
/// The shape decides how the binder uploads it: scalars become 1-float
/// uniforms, booleans become integer 0/1, vectors of length 2-4 become the
/// matching `vecN` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vector(Vec<f32>),
}

impl UniformValue {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Vector(values) => match values.len() {
                2 => "vec2",
                3 => "vec3",
                4 => "vec4",
                _ => "vector",
            },
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.2}"),
            Self::Vector(values) => {
                f.write_str("(")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value:.2}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// UI control hint attached with a trailing `// option: <hint>` comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiOption {
    #[default]
    Default,
    Slider,
    ColorPicker,
    #[serde(rename = "2DController")]
    Controller2d,
    #[serde(rename = "3DController")]
    Controller3d,
}

impl UiOption {
    /// Parses an option hint. Unknown hints fall back to [`UiOption::Default`].
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "slider" => Self::Slider,
            "colorpicker" | "color" => Self::ColorPicker,
            "2dcontroller" => Self::Controller2d,
            "3dcontroller" => Self::Controller3d,
            _ => Self::Default,
        }
    }

    /// Resolves the hint against the declared type; mismatches degrade to
    /// the default control for that type.
    pub fn effective_for(self, glsl_type: GlslType) -> Self {
        match (self, glsl_type) {
            (Self::Slider, GlslType::Float) => Self::Slider,
            (Self::ColorPicker, GlslType::Vec3 | GlslType::Vec4) => Self::ColorPicker,
            (Self::Controller2d, GlslType::Vec2) => Self::Controller2d,
            (Self::Controller3d, GlslType::Vec3) => Self::Controller3d,
            _ => Self::Default,
        }
    }
}

impl fmt::Display for UiOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Slider => "slider",
            Self::ColorPicker => "colorPicker",
            Self::Controller2d => "2DController",
            Self::Controller3d => "3DController",
        })
    }
}

/// A user uniform discovered in shader source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformDeclaration {
    pub name: String,
    pub glsl_type: GlslType,
    pub ui_option: UiOption,
    pub current_value: UniformValue,
}

impl UniformDeclaration {
    /// Builds a declaration initialised to the type's zero value.
    pub fn new(name: impl Into<String>, glsl_type: GlslType, ui_option: UiOption) -> Self {
        Self {
            name: name.into(),
            glsl_type,
            ui_option,
            current_value: glsl_type.default_value(),
        }
    }

    /// GLSL declaration line for this uniform.
    pub fn declaration(&self) -> String {
        format!("uniform {} {};", self.glsl_type, self.name)
    }
}

/// A `print("label", expr);` call rewritten into a debug variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugPrintSite {
    pub label: String,
    pub source_expression: String,
    pub insertion_order: usize,
}

impl DebugPrintSite {
    /// Name of the injected global that receives the printed value.
    pub fn variable(&self) -> String {
        debug_variable_name(self.insertion_order)
    }
}

pub(crate) fn debug_variable_name(index: usize) -> String {
    format!("_fragpad_debug{index}")
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}
