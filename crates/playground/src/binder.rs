use std::collections::HashMap;

use thiserror::Error;
use tracing::{trace, warn};

use crate::backend::{BackendError, GraphicsBackend};
use crate::compile::CompiledProgram;
use crate::registry::UniformRegistry;
use crate::synth::KEYBOARD_KEYS;
use crate::types::{GlslType, UniformValue};

/// Texture unit `iChannel0` samples from.
pub const SAMPLE_TEXTURE_UNIT: u32 = 0;

/// `iKeyboard` contents: no key input is wired up, so every key reads as up.
const KEYS_RELEASED: [i32; KEYBOARD_KEYS] = [0; KEYBOARD_KEYS];

/// Per-frame values for the injected uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltInUniforms {
    pub time: f32,
    /// Width, height, pixel aspect.
    pub resolution: [f32; 3],
    /// Pointer position plus click position; click components are negated
    /// while the button is up.
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub frame: i32,
}

impl BuiltInUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            time: 0.0,
            resolution: [width as f32, height as f32, 1.0],
            mouse: [0.0; 4],
            date: [0.0; 4],
            frame: 0,
        }
    }
}

/// Problems that are logged and skipped, never surfaced as failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindWarning {
    #[error("uniform `{name}` is declared {expected} but holds a {found} value")]
    ShapeMismatch {
        name: String,
        expected: GlslType,
        found: &'static str,
    },
    #[error("uniform `{name}` holds a {len}-component vector, which cannot be uploaded")]
    UnsupportedShape { name: String, len: usize },
}

/// What happened during one `bind_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindReport {
    pub bound: usize,
    /// Uniforms the program does not expose (optimised away or misspelled).
    pub missing: Vec<String>,
    pub warnings: Vec<BindWarning>,
}

/// Pushes registry values and built-ins into the current program.
pub struct UniformBinder<B: GraphicsBackend> {
    generation: Option<u64>,
    locations: HashMap<String, Option<B::Location>>,
    /// Program generation that last received the registry values.
    values_uploaded_for: Option<u64>,
    texture: Option<B::Texture>,
}

impl<B: GraphicsBackend> Default for UniformBinder<B> {
    fn default() -> Self {
        Self {
            generation: None,
            locations: HashMap::new(),
            values_uploaded_for: None,
            texture: None,
        }
    }
}

impl<B: GraphicsBackend> UniformBinder<B> {
    pub fn new() -> Self {
        Self::default()
    }

    fn location(
        &mut self,
        backend: &mut B,
        program: &CompiledProgram<B>,
        name: &str,
    ) -> Option<B::Location> {
        if self.generation != Some(program.generation) {
            self.locations.clear();
            self.generation = Some(program.generation);
        }
        if let Some(cached) = self.locations.get(name) {
            return cached.clone();
        }
        let location = backend.uniform_location(program.program, name);
        self.locations.insert(name.to_string(), location.clone());
        location
    }

    /// Uploads a new sample buffer into the `iChannel0` texture, creating
    /// the texture on first use.
    pub fn upload_samples(&mut self, backend: &mut B, samples: &[u8]) -> Result<(), BackendError> {
        let texture = match self.texture {
            Some(texture) => texture,
            None => {
                let texture = backend.create_texture()?;
                self.texture = Some(texture);
                texture
            }
        };
        backend.upload_texture_row(texture, samples);
        Ok(())
    }

    /// Binds built-ins every call and registry values when they changed or
    /// the program is new. Missing locations are skipped quietly.
    pub fn bind_all(
        &mut self,
        backend: &mut B,
        program: &CompiledProgram<B>,
        registry: &UniformRegistry,
        registry_changed: bool,
        built_ins: &BuiltInUniforms,
    ) -> BindReport {
        let mut report = BindReport::default();
        backend.use_program(Some(program.program));

        let [rx, ry, rz] = built_ins.resolution;
        let [mx, my, mz, mw] = built_ins.mouse;
        let [dx, dy, dz, dw] = built_ins.date;
        let built_in_values = [
            ("iTime", UniformValue::Float(built_ins.time)),
            ("iResolution", UniformValue::Vector(vec![rx, ry, rz])),
            ("iMouse", UniformValue::Vector(vec![mx, my, mz, mw])),
            ("iDate", UniformValue::Vector(vec![dx, dy, dz, dw])),
            ("iFrame", UniformValue::Int(built_ins.frame)),
            ("iChannel0", UniformValue::Int(SAMPLE_TEXTURE_UNIT as i32)),
        ];
        for (name, value) in &built_in_values {
            self.bind_value(backend, program, name, value, &mut report);
        }
        match self.location(backend, program, "iKeyboard") {
            Some(location) => {
                backend.set_uniform_1iv(&location, &KEYS_RELEASED);
                report.bound += 1;
            }
            None => report.missing.push("iKeyboard".to_string()),
        }
        backend.bind_texture(SAMPLE_TEXTURE_UNIT, self.texture);

        // Uniform state lives in the program object, so unchanged values
        // survive between frames.
        if !registry_changed && self.values_uploaded_for == Some(program.generation) {
            return report;
        }
        self.values_uploaded_for = Some(program.generation);
        for entry in registry.iter() {
            let found = entry.current_value.shape();
            if found != entry.glsl_type.keyword() {
                let warning = BindWarning::ShapeMismatch {
                    name: entry.name.clone(),
                    expected: entry.glsl_type,
                    found,
                };
                warn!(%warning, "skipping uniform");
                report.warnings.push(warning);
                continue;
            }
            self.bind_value(backend, program, &entry.name, &entry.current_value, &mut report);
        }
        report
    }

    fn bind_value(
        &mut self,
        backend: &mut B,
        program: &CompiledProgram<B>,
        name: &str,
        value: &UniformValue,
        report: &mut BindReport,
    ) {
        let Some(location) = self.location(backend, program, name) else {
            trace!(name, "uniform not active in program");
            report.missing.push(name.to_string());
            return;
        };
        match value {
            UniformValue::Float(x) => backend.set_uniform_1f(&location, *x),
            UniformValue::Int(x) => backend.set_uniform_1i(&location, *x),
            UniformValue::Bool(x) => backend.set_uniform_1i(&location, i32::from(*x)),
            UniformValue::Vector(values) => match values.as_slice() {
                [x, y] => backend.set_uniform_2f(&location, *x, *y),
                [x, y, z] => backend.set_uniform_3f(&location, *x, *y, *z),
                [x, y, z, w] => backend.set_uniform_4f(&location, *x, *y, *z, *w),
                _ => {
                    let warning = BindWarning::UnsupportedShape {
                        name: name.to_string(),
                        len: values.len(),
                    };
                    warn!(%warning, "skipping uniform");
                    report.warnings.push(warning);
                    return;
                }
            },
        }
        report.bound += 1;
    }

    /// Frees the sample texture.
    pub fn release(&mut self, backend: &mut B) {
        if let Some(texture) = self.texture.take() {
            backend.delete_texture(texture);
        }
        self.locations.clear();
        self.generation = None;
        self.values_uploaded_for = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompileLinkManager, VERTEX_SHADER};
    use crate::synth::{RegexSynthesizer, SourceSynthesizer};
    use crate::testing::FakeBackend;
    use crate::types::{UiOption, UniformDeclaration};

    fn linked(backend: &mut FakeBackend, source: &str) -> (CompiledProgram<FakeBackend>, UniformRegistry) {
        let synthesis = RegexSynthesizer::new().synthesize(source);
        let outcome = CompileLinkManager::new().compile_and_link(
            backend,
            VERTEX_SHADER,
            &synthesis.final_source,
            None,
        );
        let mut registry = UniformRegistry::default();
        registry.repopulate(synthesis.uniforms);
        (outcome.program.expect("program links"), registry)
    }

    #[test]
    fn binds_builtins_and_registry_values() {
        let mut backend = FakeBackend::default();
        let (program, mut registry) = linked(
            &mut backend,
            "uniform float u_speed; // option: slider\nuniform bool u_on;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(u_speed); }\n",
        );
        registry.set("u_speed", UniformValue::Float(1.5)).unwrap();
        registry.set("u_on", UniformValue::Bool(true)).unwrap();

        let mut built_ins = BuiltInUniforms::new(640, 480);
        built_ins.time = 2.0;
        let mut binder = UniformBinder::new();
        let report = binder.bind_all(&mut backend, &program, &registry, true, &built_ins);

        assert!(report.missing.is_empty(), "{:?}", report.missing);
        assert_eq!(report.bound, 9);
        assert_eq!(backend.uniform("iTime"), Some(&[2.0][..]));
        assert_eq!(backend.uniform("iResolution"), Some(&[640.0, 480.0, 1.0][..]));
        assert_eq!(backend.uniform("u_speed"), Some(&[1.5][..]));
        assert_eq!(backend.uniform("u_on"), Some(&[1.0][..]));
        assert_eq!(backend.uniform("iKeyboard"), Some(&[0.0; KEYBOARD_KEYS][..]));
        assert_eq!(backend.current, Some(program.program));
    }

    #[test]
    fn missing_locations_are_skipped() {
        let mut backend = FakeBackend::default();
        let (program, mut registry) = linked(
            &mut backend,
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n",
        );
        registry.register(UniformDeclaration::new("u_ghost", GlslType::Float, UiOption::Default));
        let report = UniformBinder::new().bind_all(
            &mut backend,
            &program,
            &registry,
            true,
            &BuiltInUniforms::new(1, 1),
        );
        assert_eq!(report.missing, ["u_ghost"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn mismatched_values_are_skipped_with_a_warning() {
        let mut backend = FakeBackend::default();
        let (program, mut registry) = linked(
            &mut backend,
            "uniform vec3 u_tint;\nuniform float u_gain;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(u_tint * u_gain, 1.0); }\n",
        );
        let mut tint = UniformDeclaration::new("u_tint", GlslType::Vec3, UiOption::ColorPicker);
        tint.current_value = UniformValue::Float(0.5);
        registry.repopulate([
            tint,
            UniformDeclaration::new("u_gain", GlslType::Float, UiOption::Slider),
        ]);

        let report = UniformBinder::new().bind_all(
            &mut backend,
            &program,
            &registry,
            true,
            &BuiltInUniforms::new(1, 1),
        );
        assert_eq!(
            report.warnings,
            [BindWarning::ShapeMismatch {
                name: "u_tint".into(),
                expected: GlslType::Vec3,
                found: "float",
            }]
        );
        assert_eq!(backend.uniform("u_tint"), None);
        assert_eq!(backend.uniform("u_gain"), Some(&[0.0][..]));
    }

    #[test]
    fn oversized_vectors_are_reported() {
        let mut backend = FakeBackend::default();
        let (program, _) = linked(
            &mut backend,
            "uniform vec4 u_wide;\nvoid mainImage(out vec4 c, in vec2 p) { c = u_wide; }\n",
        );
        let mut binder = UniformBinder::new();
        let mut report = BindReport::default();
        binder.bind_value(
            &mut backend,
            &program,
            "u_wide",
            &UniformValue::Vector(vec![1.0; 5]),
            &mut report,
        );
        assert_eq!(report.bound, 0);
        assert_eq!(
            report.warnings,
            [BindWarning::UnsupportedShape {
                name: "u_wide".into(),
                len: 5,
            }]
        );
        assert_eq!(backend.uniform("u_wide"), None);
    }

    #[test]
    fn sample_texture_is_created_once() {
        let mut backend = FakeBackend::default();
        let mut binder = UniformBinder::<FakeBackend>::new();
        binder.upload_samples(&mut backend, &[1, 2, 3]).unwrap();
        binder.upload_samples(&mut backend, &[4, 5, 6]).unwrap();
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(backend.texture_uploads.len(), 2);
        binder.release(&mut backend);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn locations_are_cached_per_generation() {
        let mut backend = FakeBackend::default();
        let (program, registry) = linked(
            &mut backend,
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n",
        );
        let mut binder = UniformBinder::new();
        binder.bind_all(&mut backend, &program, &registry, true, &BuiltInUniforms::new(1, 1));
        assert_eq!(binder.locations.len(), 7);
        binder.bind_all(&mut backend, &program, &registry, false, &BuiltInUniforms::new(1, 1));
        assert_eq!(binder.generation, Some(program.generation));
    }

    #[test]
    fn registry_values_are_uploaded_only_after_a_change() {
        let mut backend = FakeBackend::default();
        let (program, mut registry) = linked(
            &mut backend,
            "uniform float u_speed;\nuniform vec2 u_center;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(u_center, u_speed, 1.0); }\n",
        );
        let built_ins = BuiltInUniforms::new(4, 4);
        let mut binder = UniformBinder::new();

        let first = binder.bind_all(&mut backend, &program, &registry, true, &built_ins);
        assert_eq!(first.bound, 9);

        let idle = binder.bind_all(&mut backend, &program, &registry, false, &built_ins);
        assert_eq!(idle.bound, 7);

        registry.set("u_speed", UniformValue::Float(3.0)).unwrap();
        let changed = binder.bind_all(&mut backend, &program, &registry, true, &built_ins);
        assert_eq!(changed.bound, 9);
        assert_eq!(backend.uniform("u_speed"), Some(&[3.0][..]));

        let (mut relinked, _) = linked(
            &mut backend,
            "uniform float u_speed;\nuniform vec2 u_center;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(u_speed); }\n",
        );
        relinked.generation = program.generation + 1;
        let fresh = binder.bind_all(&mut backend, &relinked, &registry, false, &built_ins);
        assert_eq!(fresh.bound, 9);
    }
}
