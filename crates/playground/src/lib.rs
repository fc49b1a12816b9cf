//! Live GLSL playground core.
//!
//! Raw editor text flows through a fixed pipeline every time it settles:
//!
//! ```text
//!   TextSource ──▶ RenderLoop (debounce) ──▶ SourceSynthesizer
//!                                                  │ Synthesis
//!                                                  ▼
//!   UniformRegistry ◀── success ── CompileLinkManager ── failure ──▶ ErrorDetail
//!          │                               │ CompiledProgram (last good)
//!          ▼                               ▼
//!   UniformBinder ──▶ GraphicsBackend::draw ──▶ debug pixels ──▶ DebugSink
//! ```
//!
//! [`ShaderPlaygroundSession`] owns every piece. The graphics API sits behind
//! [`GraphicsBackend`]; the `glow` feature provides the OpenGL ES one.

pub mod backend;
pub mod binder;
pub mod compile;
pub mod debug;
#[cfg(feature = "glow")]
pub mod glow_backend;
pub mod registry;
pub mod render_loop;
pub mod runtime;
pub mod session;
pub mod source;
pub mod synth;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, GraphicsBackend};
pub use binder::{BindReport, BindWarning, BuiltInUniforms, UniformBinder};
pub use compile::{
    CompileError, CompileLinkManager, CompileOutcome, CompiledProgram, Diagnostic, ErrorDetail,
    ErrorStage, VERTEX_SHADER,
};
pub use debug::{decode_debug_pixel, CollectingSink, DebugSink, DebugValue, TracingSink};
#[cfg(feature = "glow")]
pub use glow_backend::GlowBackend;
pub use registry::{ControlRanges, ControlSpec, UniformError, UniformRegistry, ValuePersistence};
pub use render_loop::{LoopState, RenderLoop};
pub use runtime::{
    BoxedTimeSource, Debouncer, FixedTimeSource, SystemTimeSource, TimeSample, TimeSource,
    DEFAULT_DEBOUNCE,
};
pub use session::{
    FrameReport, SessionOptions, SessionSnapshot, ShaderPlaygroundSession, STARTER_SHADER,
};
pub use source::{
    BufferSource, ChannelSampleSource, ChannelTextSource, NoSamples, SampleSource, TextSource,
};
pub use synth::{
    EntryPoint, RegexSynthesizer, SourceSynthesizer, Synthesis, SynthesisAnomaly,
    BUILTIN_UNIFORMS, KEYBOARD_KEYS,
};
pub use types::{
    DebugPrintSite, GlslType, ShaderStage, UiOption, UniformDeclaration, UniformValue,
};
