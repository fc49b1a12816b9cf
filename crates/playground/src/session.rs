use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::GraphicsBackend;
use crate::binder::{BindReport, BuiltInUniforms, UniformBinder};
use crate::compile::{CompileError, CompileLinkManager, CompiledProgram, VERTEX_SHADER};
use crate::debug::{decode_debug_pixel, DebugSink, DebugValue};
use crate::registry::{ControlRanges, UniformError, UniformRegistry, ValuePersistence};
use crate::render_loop::{LoopState, RenderLoop};
use crate::runtime::{date_uniform, BoxedTimeSource, SystemTimeSource, DEFAULT_DEBOUNCE};
use crate::source::{SampleSource, TextSource};
use crate::synth::{RegexSynthesizer, SourceSynthesizer, Synthesis};
use crate::types::{UniformDeclaration, UniformValue};

/// Shader compiled when the text source is blank.
pub const STARTER_SHADER: &str = r"uniform float u_speed; // option: slider
uniform vec3 u_color;  // option: colorPicker

void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    vec3 wave = 0.5 + 0.5 * cos(iTime * (1.0 + u_speed) + uv.xyx + vec3(0.0, 2.0, 4.0));
    vec3 tint = mix(vec3(1.0), u_color, step(0.0001, dot(u_color, u_color)));
    fragColor = vec4(wave * tint, 1.0);
}
";

/// Construction parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub ranges: ControlRanges,
    pub persistence: ValuePersistence,
    pub width: u32,
    pub height: u32,
    /// Uniforms declared for the user when the source omits them.
    pub presets: Vec<UniformDeclaration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            ranges: ControlRanges::default(),
            persistence: ValuePersistence::default(),
            width: 800,
            height: 600,
            presets: Vec::new(),
        }
    }
}

/// Result of a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// False until the first successful compile.
    pub drawn: bool,
    pub recompiled: bool,
    pub bind: BindReport,
}

/// Serializable view of the session for secondary surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub source: Option<String>,
    pub state: LoopState,
    pub uniforms: BTreeMap<String, UniformValue>,
    pub debug_values: Vec<DebugValue>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Pointer {
    position: [f32; 2],
    click: [f32; 2],
    pressed: bool,
}

impl Pointer {
    fn uniform(&self) -> [f32; 4] {
        let sign = if self.pressed { 1.0 } else { -1.0 };
        [
            self.position[0],
            self.position[1],
            sign * self.click[0].abs(),
            sign * self.click[1].abs(),
        ]
    }
}

/// Owns everything a live shader playground needs: the graphics backend,
/// the current program, the uniform registry and the debounced loop.
pub struct ShaderPlaygroundSession<B: GraphicsBackend, S: SourceSynthesizer = RegexSynthesizer> {
    backend: B,
    synthesizer: S,
    manager: CompileLinkManager,
    current: Option<CompiledProgram<B>>,
    synthesis: Option<Synthesis>,
    last_error: Option<CompileError>,
    binder: UniformBinder<B>,
    registry: UniformRegistry,
    render_loop: RenderLoop,
    time: BoxedTimeSource,
    size: (u32, u32),
    pointer: Pointer,
    debug_values: Vec<DebugValue>,
}

impl<B: GraphicsBackend> ShaderPlaygroundSession<B, RegexSynthesizer> {
    pub fn new(backend: B, options: SessionOptions) -> Self {
        let synthesizer = RegexSynthesizer::new().with_presets(options.presets.clone());
        Self::with_synthesizer(backend, synthesizer, options)
    }
}

impl<B: GraphicsBackend, S: SourceSynthesizer> ShaderPlaygroundSession<B, S> {
    pub fn with_synthesizer(backend: B, synthesizer: S, options: SessionOptions) -> Self {
        Self {
            backend,
            synthesizer,
            manager: CompileLinkManager::new(),
            current: None,
            synthesis: None,
            last_error: None,
            binder: UniformBinder::new(),
            registry: UniformRegistry::new(options.ranges, options.persistence),
            render_loop: RenderLoop::new(options.debounce),
            time: Box::new(SystemTimeSource::new()),
            size: (options.width.max(1), options.height.max(1)),
            pointer: Pointer::default(),
            debug_values: Vec::new(),
        }
    }

    /// Replaces the clock driving `iTime` and `iFrame`.
    pub fn with_time_source(mut self, time: BoxedTimeSource) -> Self {
        self.time = time;
        self
    }

    /// Synthesizes and compiles `text` right away. Returns whether a new
    /// program became current; on failure the previous program stays.
    pub fn recompile(&mut self, text: &str) -> bool {
        let synthesis = self.synthesizer.synthesize(text);
        for anomaly in &synthesis.anomalies {
            debug!(%anomaly, "source anomaly");
        }

        let outcome = self.manager.compile_and_link(
            &mut self.backend,
            VERTEX_SHADER,
            &synthesis.final_source,
            self.current.take(),
        );
        self.current = outcome.program;

        match outcome.error {
            None => {
                self.registry.repopulate(synthesis.uniforms.iter().cloned());
                info!(
                    uniforms = self.registry.len(),
                    debug_sites = synthesis.debug_sites.len(),
                    "shader compiled"
                );
                self.synthesis = Some(synthesis);
                self.last_error = None;
                self.debug_values.clear();
                true
            }
            Some(mut error) => {
                error.attribute_lines(|line| synthesis.map_line(line));
                warn!(
                    line = error.detail().and_then(|detail| detail.first_line()),
                    "{}",
                    error.render()
                );
                self.last_error = Some(error);
                false
            }
        }
    }

    /// One iteration of the frame loop: pull edits, recompile when the
    /// debounce window has passed, upload samples and draw.
    pub fn tick(
        &mut self,
        text: &mut dyn TextSource,
        samples: &mut dyn SampleSource,
        sink: &mut dyn DebugSink,
        now: Instant,
    ) -> FrameReport {
        if text.changed() || self.render_loop.state() == LoopState::Idle {
            let value = text.get_value();
            let value = if value.trim().is_empty() {
                STARTER_SHADER
            } else {
                value
            };
            self.render_loop.observe(value, now);
        }

        let mut recompiled = false;
        if let Some(source) = self.render_loop.poll(now) {
            recompiled = self.recompile(&source);
            self.render_loop.finish_compile(source);
        }

        if let Some(buffer) = samples.latest_samples() {
            if let Err(error) = self.binder.upload_samples(&mut self.backend, &buffer) {
                warn!(%error, "sample texture unavailable");
            }
        }

        let mut report = self.render_frame(sink);
        report.recompiled = recompiled;
        report
    }

    /// Binds uniforms, draws and publishes debug values for the current
    /// program. Clears the surface and draws nothing before the first
    /// successful compile.
    pub fn render_frame(&mut self, sink: &mut dyn DebugSink) -> FrameReport {
        let (width, height) = self.size;
        self.backend.begin_frame(width, height);

        let Some(program) = self.current.as_ref() else {
            return FrameReport::default();
        };

        let sample = self.time.sample();
        let built_ins = BuiltInUniforms {
            time: sample.seconds,
            resolution: [width as f32, height as f32, 1.0],
            mouse: self.pointer.uniform(),
            date: date_uniform(&chrono::Local::now()),
            frame: i32::try_from(sample.frame_index).unwrap_or(i32::MAX),
        };
        let registry_changed = self.registry.take_dirty();
        let bind = self.binder.bind_all(
            &mut self.backend,
            program,
            &self.registry,
            registry_changed,
            &built_ins,
        );
        self.backend.draw_fullscreen_quad();

        self.debug_values.clear();
        if let Some(synthesis) = &self.synthesis {
            for site in &synthesis.debug_sites {
                let Ok(column) = u32::try_from(site.insertion_order) else {
                    break;
                };
                if column >= width {
                    break;
                }
                let pixel = self.backend.read_pixel(column, 0);
                self.debug_values.push(DebugValue {
                    label: site.label.clone(),
                    value: decode_debug_pixel(pixel),
                });
            }
        }
        if !self.debug_values.is_empty() {
            sink.publish(&self.debug_values);
        }

        FrameReport {
            drawn: true,
            recompiled: false,
            bind,
        }
    }

    /// Updates a user uniform; takes effect on the next frame without
    /// recompiling.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        self.registry.set(name, value)
    }

    /// Pointer position in pixels, origin bottom-left.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer.position = [x, y];
    }

    pub fn set_button(&mut self, pressed: bool) {
        if pressed && !self.pointer.pressed {
            self.pointer.click = self.pointer.position;
        }
        self.pointer.pressed = pressed;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn state(&self) -> LoopState {
        self.render_loop.state()
    }

    /// Text of the most recent compile attempt, successful or not.
    pub fn source(&self) -> Option<&str> {
        self.render_loop.last_compiled()
    }

    pub fn current_program(&self) -> Option<&CompiledProgram<B>> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&CompileError> {
        self.last_error.as_ref()
    }

    /// Synthesis that produced the current program.
    pub fn synthesis(&self) -> Option<&Synthesis> {
        self.synthesis.as_ref()
    }

    pub fn registry(&self) -> &UniformRegistry {
        &self.registry
    }

    pub fn debug_values(&self) -> &[DebugValue] {
        &self.debug_values
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source: self.render_loop.last_compiled().map(str::to_string),
            state: self.render_loop.state(),
            uniforms: self.registry.snapshot(),
            debug_values: self.debug_values.clone(),
            error: self.last_error.as_ref().map(CompileError::render),
        }
    }

    /// Releases every GPU object and hands the backend back.
    pub fn shutdown(mut self) -> B {
        if let Some(program) = self.current.take() {
            self.backend.use_program(None);
            self.backend.delete_program(program.program);
        }
        self.binder.release(&mut self.backend);
        self.backend
    }
}
