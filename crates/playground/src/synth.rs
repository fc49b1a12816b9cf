//! Turns raw user shader text into a complete GLSL ES fragment shader.
//!
//! The scan is deliberately pattern based: it only needs to understand
//! `uniform <type> <name>;` declarations, `print("label", expr);` calls and
//! the `main`/`mainImage` entry points. Everything else passes through
//! untouched and structural mistakes are left for the driver to report.
//!
//! Layout of the synthesized source:
//!
//! 1. precision qualifiers and the built-in uniforms ([`PRELUDE`])
//! 2. preset uniforms the user source does not already declare
//! 3. one `float _fragpad_debugN = 0.0;` per print site plus the encoder
//! 4. the user source, line for line
//! 5. a generated `main` when needed
//!
//! Sections 1-3 make up [`Synthesis::injected_lines`], which is what maps
//! driver line numbers back onto the editor.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::types::{
    debug_variable_name, DebugPrintSite, GlslType, UiOption, UniformDeclaration,
};

/// Built-in uniforms injected ahead of every user shader.
pub const BUILTIN_UNIFORMS: [&str; 7] = [
    "iTime",
    "iResolution",
    "iMouse",
    "iChannel0",
    "iDate",
    "iFrame",
    "iKeyboard",
];

/// Length of the `iKeyboard` key-state array.
pub const KEYBOARD_KEYS: usize = 256;

/// Half-width of the value range a debug pixel can carry.
pub const DEBUG_VALUE_RANGE: f32 = 1024.0;

const USER_MAIN: &str = "_fragpad_user_main";

/// Precision block and built-in declarations.
///
/// Names must stay in sync with [`BUILTIN_UNIFORMS`] and the binder.
const PRELUDE: &str = r"#ifdef GL_FRAGMENT_PRECISION_HIGH
precision highp float;
#else
precision mediump float;
#endif
precision mediump int;

uniform float iTime;
uniform vec3 iResolution;
uniform vec4 iMouse;
uniform sampler2D iChannel0;
uniform vec4 iDate;
uniform int iFrame;
uniform int iKeyboard[256];
";

/// Packs a value from `[-DEBUG_VALUE_RANGE, DEBUG_VALUE_RANGE]` into RGBA8.
///
/// `debug::decode_debug_pixel` is the inverse.
const DEBUG_ENCODER: &str = r"vec4 _fragpad_encode(float value) {
    float x = clamp((value + 1024.0) / 2048.0, 0.0, 0.999999);
    vec4 enc = fract(x * vec4(1.0, 255.0, 65025.0, 16581375.0));
    enc -= enc.yzww * vec4(1.0 / 255.0, 1.0 / 255.0, 1.0 / 255.0, 0.0);
    return enc;
}
";

/// Entry point convention found in the user source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryPoint {
    /// ShaderToy style `void mainImage(out vec4, in vec2)`; a `main` is generated.
    MainImage,
    /// The user wrote their own `main`.
    Main,
    /// Neither convention was found.
    Missing,
}

/// Non-fatal oddities noticed while synthesizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SynthesisAnomaly {
    #[error("no `mainImage` or `main` entry point found")]
    MissingEntryPoint,
    #[error("`#version` directive on line {line} was disabled")]
    VersionDirectiveRemoved { line: usize },
    #[error("built-in uniform `{name}` redeclared on line {line}; the injected declaration is used")]
    BuiltInRedeclared { name: String, line: usize },
}

/// Output of one synthesis pass.
#[derive(Debug, Clone, Serialize)]
pub struct Synthesis {
    pub final_source: String,
    pub uniforms: Vec<UniformDeclaration>,
    pub debug_sites: Vec<DebugPrintSite>,
    pub injected_lines: usize,
    pub user_lines: usize,
    pub entry_point: EntryPoint,
    pub anomalies: Vec<SynthesisAnomaly>,
}

impl Synthesis {
    /// Translates a 1-based line reported against `final_source` into a
    /// 1-based line of the user source.
    ///
    /// Returns `None` for lines inside the injected prelude or the generated
    /// `main`.
    pub fn map_line(&self, reported: u32) -> Option<u32> {
        let reported = reported as usize;
        let user_line = reported.checked_sub(self.injected_lines)?;
        if user_line == 0 || user_line > self.user_lines {
            return None;
        }
        u32::try_from(user_line).ok()
    }
}

/// Seam between callers and the text transform, so the pattern scanner can
/// be replaced by a real lexer without touching the session.
pub trait SourceSynthesizer {
    fn synthesize(&self, raw_source: &str) -> Synthesis;
}

/// Pattern-matching synthesizer.
#[derive(Debug, Clone, Default)]
pub struct RegexSynthesizer {
    presets: Vec<UniformDeclaration>,
}

impl RegexSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds uniforms that are declared for the user when the source does not
    /// declare them itself (for example presets from the config file).
    pub fn with_presets(mut self, presets: Vec<UniformDeclaration>) -> Self {
        self.presets = presets;
        self
    }

    pub fn presets(&self) -> &[UniformDeclaration] {
        &self.presets
    }
}

impl SourceSynthesizer for RegexSynthesizer {
    fn synthesize(&self, raw_source: &str) -> Synthesis {
        let mut anomalies = Vec::new();
        let mut uniforms = scan_uniforms(raw_source);
        let (rewritten, debug_sites) = rewrite_prints(raw_source);
        let sanitized = neutralise_directives(&rewritten, &mut anomalies);

        let user_main = first_live_match(main_regex(), &sanitized);
        let entry_point = if user_main.is_some() {
            EntryPoint::Main
        } else if first_live_match(main_image_regex(), &sanitized).is_some() {
            EntryPoint::MainImage
        } else {
            anomalies.push(SynthesisAnomaly::MissingEntryPoint);
            EntryPoint::Missing
        };

        let body = match user_main {
            Some(name) if !debug_sites.is_empty() => {
                let mut renamed = String::with_capacity(sanitized.len() + USER_MAIN.len());
                renamed.push_str(&sanitized[..name.start]);
                renamed.push_str(USER_MAIN);
                renamed.push_str(&sanitized[name.end..]);
                renamed
            }
            _ => sanitized,
        };

        let mut prefix = String::from(PRELUDE);

        let declared: HashSet<String> = uniforms.iter().map(|u| u.name.clone()).collect();
        let mut injected_presets = Vec::new();
        for preset in &self.presets {
            if declared.contains(&preset.name) || BUILTIN_UNIFORMS.contains(&preset.name.as_str()) {
                continue;
            }
            injected_presets.push(preset.clone());
        }
        if !injected_presets.is_empty() {
            prefix.push('\n');
            for preset in &injected_presets {
                prefix.push_str(&preset.declaration());
                prefix.push('\n');
            }
        }
        uniforms.extend(injected_presets);

        if !debug_sites.is_empty() {
            prefix.push('\n');
            for site in &debug_sites {
                prefix.push_str(&format!("float {} = 0.0;\n", site.variable()));
            }
            prefix.push_str(DEBUG_ENCODER);
        }
        prefix.push('\n');

        let injected_lines = prefix.matches('\n').count();
        let user_lines = raw_source.lines().count();

        let mut final_source = prefix;
        final_source.push_str(&body);
        if !final_source.ends_with('\n') {
            final_source.push('\n');
        }
        if let Some(main) = synthesized_main(entry_point, &debug_sites) {
            final_source.push_str(&main);
        }

        debug!(
            uniforms = uniforms.len(),
            debug_sites = debug_sites.len(),
            injected_lines,
            ?entry_point,
            "synthesized fragment shader"
        );

        Synthesis {
            final_source,
            uniforms,
            debug_sites,
            injected_lines,
            user_lines,
            entry_point,
            anomalies,
        }
    }
}

fn uniform_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"\buniform\s+(float|vec[2-4]|int|bool)\s+([A-Za-z_]\w*)\s*;[ \t]*(?://[ \t]*option[ \t]*:[ \t]*(\w+))?",
        )
        .unwrap()
    })
}

fn print_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"\bprint\s*\(\s*"([^"\n]*)"\s*,\s*([^;]+?)\s*\)\s*;"#).unwrap()
    })
}

fn builtin_decl_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*uniform\s+\w+\s+([A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*;").unwrap()
    })
}

fn main_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\bvoid\s+(main)\s*\(").unwrap())
}

fn main_image_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\bvoid\s+(mainImage)\s*\(").unwrap())
}

/// Byte range of the function name in the first entry-point match that is
/// not commented out.
fn first_live_match(regex: &Regex, source: &str) -> Option<Range<usize>> {
    regex
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .find(|name| !in_line_comment(source, name.start()))
        .map(|name| name.range())
}

/// True when the match at `offset` sits behind a `//` on its own line.
fn in_line_comment(source: &str, offset: usize) -> bool {
    let line_start = source[..offset].rfind('\n').map_or(0, |index| index + 1);
    source[line_start..offset].contains("//")
}

fn scan_uniforms(source: &str) -> Vec<UniformDeclaration> {
    let mut seen = HashSet::new();
    let mut uniforms = Vec::new();
    for captures in uniform_regex().captures_iter(source) {
        let (Some(whole), Some(keyword), Some(name)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        if in_line_comment(source, whole.start()) {
            continue;
        }
        let name = name.as_str();
        if BUILTIN_UNIFORMS.contains(&name) || !seen.insert(name.to_string()) {
            continue;
        }
        let Some(glsl_type) = GlslType::from_keyword(keyword.as_str()) else {
            continue;
        };
        let option = captures
            .get(3)
            .map_or(UiOption::Default, |hint| UiOption::from_hint(hint.as_str()));
        uniforms.push(UniformDeclaration::new(name, glsl_type, option));
    }
    uniforms
}

fn rewrite_prints(source: &str) -> (String, Vec<DebugPrintSite>) {
    let mut output = String::with_capacity(source.len());
    let mut sites = Vec::new();
    let mut cursor = 0;

    for captures in print_regex().captures_iter(source) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if in_line_comment(source, whole.start()) {
            continue;
        }
        let label = captures.get(1).map_or("", |m| m.as_str());
        let expression = captures.get(2).map_or("", |m| m.as_str()).trim();
        let index = sites.len();
        let replacement = format!("{} = float({});", debug_variable_name(index), expression);

        output.push_str(&source[cursor..whole.start()]);
        output.push_str(&replacement);
        // Keep the line count intact when the call spanned several lines.
        let dropped = whole
            .as_str()
            .matches('\n')
            .count()
            .saturating_sub(replacement.matches('\n').count());
        output.extend(std::iter::repeat('\n').take(dropped));
        cursor = whole.end();

        sites.push(DebugPrintSite {
            label: label.to_string(),
            source_expression: expression.to_string(),
            insertion_order: index,
        });
    }
    output.push_str(&source[cursor..]);
    (output, sites)
}

/// Comments out `#version` and built-in redeclarations in place.
fn neutralise_directives(source: &str, anomalies: &mut Vec<SynthesisAnomaly>) -> String {
    let mut output = String::with_capacity(source.len() + 16);
    let mut skipped_version = false;
    for (index, line) in source.split_inclusive('\n').enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            anomalies.push(SynthesisAnomaly::VersionDirectiveRemoved { line: line_number });
            output.push_str("// ");
            output.push_str(line);
            continue;
        }
        if let Some(name) = builtin_decl_regex()
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str())
        {
            if BUILTIN_UNIFORMS.contains(&name) {
                anomalies.push(SynthesisAnomaly::BuiltInRedeclared {
                    name: name.to_string(),
                    line: line_number,
                });
                output.push_str("// ");
                output.push_str(line);
                continue;
            }
        }
        output.push_str(line);
    }
    output
}

fn synthesized_main(entry_point: EntryPoint, sites: &[DebugPrintSite]) -> Option<String> {
    let call = match entry_point {
        EntryPoint::MainImage => {
            "    vec4 color = vec4(0.0);\n    mainImage(color, gl_FragCoord.xy);\n    gl_FragColor = color;\n"
                .to_string()
        }
        EntryPoint::Main if !sites.is_empty() => format!("    {USER_MAIN}();\n"),
        _ => return None,
    };

    let mut main = String::from("\nvoid main() {\n");
    main.push_str(&call);
    if !sites.is_empty() {
        main.push_str("    if (int(gl_FragCoord.y) == 0) {\n");
        main.push_str("        int column = int(gl_FragCoord.x);\n");
        for site in sites {
            main.push_str(&format!(
                "        if (column == {}) gl_FragColor = _fragpad_encode({});\n",
                site.insertion_order,
                site.variable()
            ));
        }
        main.push_str("    }\n");
    }
    main.push_str("}\n");
    Some(main)
}
