use std::fmt::{self, Write as _};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{BackendError, GraphicsBackend};
use crate::types::ShaderStage;

/// Pass-through vertex stage for the full-screen quad.
pub const VERTEX_SHADER: &str = r"attribute vec2 a_position;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStage {
    Vertex,
    Fragment,
    Link,
}

impl From<ShaderStage> for ErrorStage {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::Vertex,
            ShaderStage::Fragment => Self::Fragment,
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Link => "link",
        })
    }
}

/// One message from a driver info log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Line as reported against the synthesized source.
    pub reported_line: Option<u32>,
    /// Line in the user's source, when attributable.
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

/// Structured view of a failed compile or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub stage: ErrorStage,
    pub raw_message: String,
    pub diagnostics: Vec<Diagnostic>,
}

fn angle_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // ERROR: 0:12: 'foo' : undeclared identifier
    REGEX.get_or_init(|| Regex::new(r"^\s*(?:ERROR|WARNING):\s*\d+:(\d+):\s*(.*)$").unwrap())
}

fn mesa_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // 0:12(5): error: syntax error, unexpected IDENTIFIER
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*\d+:(\d+)\((\d+)\):\s*(?:error|warning)?:?\s*(.*)$").unwrap()
    })
}

fn nvidia_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // 0(12) : error C0000: syntax error, unexpected identifier
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*\d+\((\d+)\)\s*:\s*(?:fatal\s+)?(?:error|warning)\s*\w*\s*:\s*(.*)$")
            .unwrap()
    })
}

impl ErrorDetail {
    /// Parses a driver info log. Unrecognised lines are kept as unattributed
    /// diagnostics so nothing the driver said is lost.
    pub fn parse(stage: ErrorStage, raw_message: &str) -> Self {
        let mut diagnostics = Vec::new();
        for line in raw_message.lines() {
            let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            if line.is_empty() {
                continue;
            }
            diagnostics.push(parse_log_line(line));
        }
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic {
                reported_line: None,
                line: None,
                column: None,
                message: format!("{stage} stage failed without a driver message"),
            });
        }
        Self {
            stage,
            raw_message: raw_message.to_string(),
            diagnostics,
        }
    }

    /// Converts reported lines into user-source lines with `map`.
    ///
    /// Only fragment diagnostics point into user text; other stages stay
    /// unattributed.
    pub fn attribute_lines<F>(&mut self, map: F)
    where
        F: Fn(u32) -> Option<u32>,
    {
        for diagnostic in &mut self.diagnostics {
            diagnostic.line = match self.stage {
                ErrorStage::Fragment => diagnostic.reported_line.and_then(&map),
                ErrorStage::Vertex | ErrorStage::Link => None,
            };
        }
    }

    /// First user line mentioned by any diagnostic.
    pub fn first_line(&self) -> Option<u32> {
        self.diagnostics.iter().find_map(|diagnostic| diagnostic.line)
    }

    /// Multi-line report suitable for an error panel or terminal.
    pub fn render(&self) -> String {
        let mut out = match self.stage {
            ErrorStage::Link => String::from("program failed to link"),
            stage => format!("{stage} shader failed to compile"),
        };
        for diagnostic in &self.diagnostics {
            out.push_str("\n  ");
            match (diagnostic.line, diagnostic.column) {
                (Some(line), Some(column)) => {
                    let _ = write!(out, "line {line}:{column}: ");
                }
                (Some(line), None) => {
                    let _ = write!(out, "line {line}: ");
                }
                (None, _) if diagnostic.reported_line.is_some() => out.push_str("(generated code) "),
                (None, _) => {}
            }
            out.push_str(&diagnostic.message);
        }
        out
    }
}

fn parse_log_line(line: &str) -> Diagnostic {
    let number = |text: &str| text.parse::<u32>().ok();
    if let Some(captures) = mesa_regex().captures(line) {
        return Diagnostic {
            reported_line: number(&captures[1]),
            line: None,
            column: number(&captures[2]),
            message: captures[3].trim().to_string(),
        };
    }
    if let Some(captures) = angle_regex().captures(line) {
        return Diagnostic {
            reported_line: number(&captures[1]),
            line: None,
            column: None,
            message: captures[2].trim().to_string(),
        };
    }
    if let Some(captures) = nvidia_regex().captures(line) {
        return Diagnostic {
            reported_line: number(&captures[1]),
            line: None,
            column: None,
            message: captures[2].trim().to_string(),
        };
    }
    Diagnostic {
        reported_line: None,
        line: None,
        column: None,
        message: line.to_string(),
    }
}

/// Why a compile attempt did not produce a new program.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{stage} shader failed to compile")]
    Compile {
        stage: ShaderStage,
        detail: ErrorDetail,
    },
    #[error("program failed to link")]
    Link { detail: ErrorDetail },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CompileError {
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Compile { detail, .. } | Self::Link { detail } => Some(detail),
            Self::Backend(_) => None,
        }
    }

    pub fn attribute_lines<F>(&mut self, map: F)
    where
        F: Fn(u32) -> Option<u32>,
    {
        if let Self::Compile { detail, .. } | Self::Link { detail } = self {
            detail.attribute_lines(map);
        }
    }

    pub fn render(&self) -> String {
        match self.detail() {
            Some(detail) => detail.render(),
            None => self.to_string(),
        }
    }
}

/// A successfully linked program.
pub struct CompiledProgram<B: GraphicsBackend> {
    pub program: B::Program,
    /// Increments with every successful link; lets callers drop caches.
    pub generation: u64,
}

impl<B: GraphicsBackend> fmt::Debug for CompiledProgram<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("program", &self.program)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Result of a compile attempt.
///
/// `program` is whatever should be current afterwards: the new program on
/// success, the untouched previous one on failure.
pub struct CompileOutcome<B: GraphicsBackend> {
    pub program: Option<CompiledProgram<B>>,
    pub error: Option<CompileError>,
}

impl<B: GraphicsBackend> CompileOutcome<B> {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Compiles and links program pairs while keeping the last good program.
#[derive(Debug, Default)]
pub struct CompileLinkManager {
    generation: u64,
}

impl CompileLinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn compile_and_link<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
        previous: Option<CompiledProgram<B>>,
    ) -> CompileOutcome<B> {
        match self.build(backend, vertex_source, fragment_source) {
            Ok(program) => {
                if let Some(previous) = previous {
                    debug!(generation = previous.generation, "disposing replaced program");
                    backend.delete_program(previous.program);
                }
                CompileOutcome {
                    program: Some(program),
                    error: None,
                }
            }
            Err(error) => {
                warn!(%error, kept_previous = previous.is_some(), "shader rebuild failed");
                CompileOutcome {
                    program: previous,
                    error: Some(error),
                }
            }
        }
    }

    fn build<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<CompiledProgram<B>, CompileError> {
        let vertex = compile_stage(backend, ShaderStage::Vertex, vertex_source)?;
        let fragment = match compile_stage(backend, ShaderStage::Fragment, fragment_source) {
            Ok(shader) => shader,
            Err(error) => {
                backend.delete_shader(vertex);
                return Err(error);
            }
        };
        let program = match backend.create_program() {
            Ok(program) => program,
            Err(error) => {
                backend.delete_shader(vertex);
                backend.delete_shader(fragment);
                return Err(error.into());
            }
        };

        backend.attach_shader(program, vertex);
        backend.attach_shader(program, fragment);
        let linked = backend.link_program(program);
        for shader in [vertex, fragment] {
            backend.detach_shader(program, shader);
            backend.delete_shader(shader);
        }

        if let Err(log) = linked {
            backend.delete_program(program);
            return Err(CompileError::Link {
                detail: ErrorDetail::parse(ErrorStage::Link, &log),
            });
        }

        self.generation += 1;
        debug!(generation = self.generation, "linked shader program");
        Ok(CompiledProgram {
            program,
            generation: self.generation,
        })
    }
}

fn compile_stage<B: GraphicsBackend>(
    backend: &mut B,
    stage: ShaderStage,
    source: &str,
) -> Result<B::Shader, CompileError> {
    let shader = backend.create_shader(stage)?;
    match backend.compile_shader(shader, source) {
        Ok(()) => Ok(shader),
        Err(log) => {
            backend.delete_shader(shader);
            Err(CompileError::Compile {
                stage,
                detail: ErrorDetail::parse(stage.into(), &log),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    const GOOD: &str = "void main() { gl_FragColor = vec4(1.0); }\n";

    #[test]
    fn parses_common_driver_formats() {
        let log = "ERROR: 0:14: 'foo' : undeclared identifier\n\
                   0:15(7): error: syntax error, unexpected '}'\n\
                   0(16) : error C0000: syntax error, unexpected ';'\n\
                   ERROR: 1 compilation errors.  No code generated.\n\0";
        let detail = ErrorDetail::parse(ErrorStage::Fragment, log);
        let lines: Vec<_> = detail.diagnostics.iter().map(|d| d.reported_line).collect();
        assert_eq!(lines, [Some(14), Some(15), Some(16), None]);
        assert_eq!(detail.diagnostics[0].message, "'foo' : undeclared identifier");
        assert_eq!(detail.diagnostics[1].column, Some(7));
        assert_eq!(detail.diagnostics[2].message, "syntax error, unexpected ';'");
    }

    #[test]
    fn attribution_maps_fragment_lines_only() {
        let mut detail = ErrorDetail::parse(ErrorStage::Fragment, "ERROR: 0:20: oops");
        detail.attribute_lines(|line| line.checked_sub(15));
        assert_eq!(detail.first_line(), Some(5));
        assert!(detail.render().contains("line 5: oops"));

        let mut link = ErrorDetail::parse(ErrorStage::Link, "ERROR: 0:20: oops");
        link.attribute_lines(|line| Some(line));
        assert_eq!(link.first_line(), None);
    }

    #[test]
    fn empty_log_still_yields_a_diagnostic() {
        let detail = ErrorDetail::parse(ErrorStage::Link, "");
        assert_eq!(detail.diagnostics.len(), 1);
        assert!(detail.render().starts_with("program failed to link"));
    }

    #[test]
    fn failed_fragment_keeps_previous_program() {
        let mut backend = FakeBackend::default();
        let mut manager = CompileLinkManager::new();
        let first = manager.compile_and_link(&mut backend, VERTEX_SHADER, GOOD, None);
        assert!(first.succeeded());
        let first_program = first.program.as_ref().map(|p| p.program);

        let broken = "void main() {\n syntax_error\n}\n";
        let outcome = manager.compile_and_link(&mut backend, VERTEX_SHADER, broken, first.program);
        assert!(matches!(
            outcome.error,
            Some(CompileError::Compile { stage: ShaderStage::Fragment, .. })
        ));
        assert_eq!(outcome.program.as_ref().map(|p| p.program), first_program);
        assert_eq!(backend.live_shaders(), 0);
        assert_eq!(backend.live_programs(), 1);
    }

    #[test]
    fn failed_link_deletes_new_program() {
        let mut backend = FakeBackend::default();
        let mut manager = CompileLinkManager::new();
        let outcome = manager.compile_and_link(
            &mut backend,
            VERTEX_SHADER,
            "float helper() { return 1.0; }\n",
            None,
        );
        assert!(matches!(outcome.error, Some(CompileError::Link { .. })));
        assert!(outcome.program.is_none());
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn success_disposes_replaced_program() {
        let mut backend = FakeBackend::default();
        let mut manager = CompileLinkManager::new();
        let first = manager.compile_and_link(&mut backend, VERTEX_SHADER, GOOD, None);
        let second = manager.compile_and_link(&mut backend, VERTEX_SHADER, GOOD, first.program);
        assert_eq!(second.program.as_ref().map(|p| p.generation), Some(2));
        assert_eq!(backend.live_programs(), 1);
        assert_eq!(backend.live_shaders(), 0);
    }
}
