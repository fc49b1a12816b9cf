//! Live uniform controls for the window: line commands on stdin and
//! keyboard nudging of a selected uniform.
//!
//! Commands:
//!
//! ```text
//! set <name> <value> [<value>...]   e.g. `set u_tint 1 0.5 0`
//! list                              print every uniform with its control
//! ```

use std::io::BufRead;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Sender;
use playground::{ControlSpec, GlslType, UniformRegistry, UniformValue};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Set { name: String, args: Vec<String> },
    List,
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some("set") => {
            let name = words
                .next()
                .ok_or_else(|| anyhow!("usage: set <name> <value> [<value>...]"))?;
            let args: Vec<String> = words.map(str::to_string).collect();
            if args.is_empty() {
                bail!("`set {name}` needs at least one value");
            }
            ControlCommand::Set {
                name: name.to_string(),
                args,
            }
        }
        Some("list") => ControlCommand::List,
        Some(other) => bail!("unknown command `{other}`; expected `set` or `list`"),
        None => return Ok(None),
    };
    Ok(Some(command))
}

/// Reads commands from stdin on a background thread until stdin closes.
pub fn spawn_stdin_reader(commands: Sender<ControlCommand>) -> Result<()> {
    thread::Builder::new()
        .name("fragpad-controls".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(%err, "failed to read control input");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!("{err:#}"),
                }
            }
            debug!("control input closed");
        })
        .context("failed to spawn control input thread")?;
    Ok(())
}

/// Builds a value of `glsl_type` from command arguments.
pub fn value_from_args(glsl_type: GlslType, args: &[String]) -> Result<UniformValue> {
    if args.len() != glsl_type.arity() {
        bail!(
            "{glsl_type} takes {} value(s), got {}",
            glsl_type.arity(),
            args.len()
        );
    }
    let value = match glsl_type {
        GlslType::Bool => UniformValue::Bool(parse_bool(&args[0])?),
        GlslType::Int => UniformValue::Int(
            args[0]
                .parse()
                .with_context(|| format!("`{}` is not an integer", args[0]))?,
        ),
        GlslType::Float => UniformValue::Float(parse_float(&args[0])?),
        GlslType::Vec2 | GlslType::Vec3 | GlslType::Vec4 => UniformValue::Vector(
            args.iter()
                .map(|arg| parse_float(arg))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(value)
}

fn parse_float(arg: &str) -> Result<f32> {
    arg.parse()
        .with_context(|| format!("`{arg}` is not a number"))
}

fn parse_bool(arg: &str) -> Result<bool> {
    match arg {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => bail!("`{arg}` is not a boolean; use true/false"),
    }
}

/// Steps `value` up or down by its control's increment.
///
/// Only scalars can be nudged; vectors are set with commands.
pub fn nudged(value: &UniformValue, spec: ControlSpec, up: bool) -> Option<UniformValue> {
    let sign = if up { 1.0 } else { -1.0 };
    match (value, spec) {
        (UniformValue::Float(v), ControlSpec::Slider { step, .. }) => {
            Some(UniformValue::Float(v + sign * step))
        }
        (UniformValue::Float(v), ControlSpec::Input { .. }) => {
            Some(UniformValue::Float(v + sign * 0.1))
        }
        (UniformValue::Int(v), _) => Some(UniformValue::Int(if up {
            v.saturating_add(1)
        } else {
            v.saturating_sub(1)
        })),
        (UniformValue::Bool(v), _) => Some(UniformValue::Bool(!v)),
        _ => None,
    }
}

/// Name of the uniform after `current` in declaration order, wrapping.
pub fn next_selection(registry: &UniformRegistry, current: Option<&str>) -> Option<String> {
    let names: Vec<&str> = registry.iter().map(|entry| entry.name.as_str()).collect();
    let next = match current.and_then(|name| names.iter().position(|n| *n == name)) {
        Some(index) => names.get((index + 1) % names.len()),
        None => names.first(),
    };
    next.map(|name| name.to_string())
}

/// One line per uniform: name, type, value and control.
pub fn describe(registry: &UniformRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|entry| {
            let control = match registry.control_for(&entry.name) {
                Some(ControlSpec::Slider { min, max, step }) => {
                    format!("slider {min}..{max} step {step}")
                }
                Some(ControlSpec::Color { components }) => format!("color ({components})"),
                Some(ControlSpec::Pad {
                    dimensions,
                    min,
                    max,
                }) => format!("pad {dimensions}d {min}..{max}"),
                Some(ControlSpec::Input { .. }) | None => "input".to_string(),
            };
            format!(
                "{:<20} {:<6} {:<24} {control}",
                entry.name,
                entry.glsl_type.keyword(),
                entry.current_value.to_string()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground::{ControlRanges, UiOption, UniformDeclaration, ValuePersistence};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn registry() -> UniformRegistry {
        let mut registry =
            UniformRegistry::new(ControlRanges::default(), ValuePersistence::CarryForward);
        registry.repopulate([
            UniformDeclaration::new("u_speed", GlslType::Float, UiOption::Slider),
            UniformDeclaration::new("u_tint", GlslType::Vec3, UiOption::ColorPicker),
            UniformDeclaration::new("u_on", GlslType::Bool, UiOption::Default),
        ]);
        registry
    }

    #[test]
    fn parses_set_and_list() {
        assert_eq!(
            parse_command("  set u_tint 1 0.5 0 ").unwrap(),
            Some(ControlCommand::Set {
                name: "u_tint".into(),
                args: args(&["1", "0.5", "0"]),
            })
        );
        assert_eq!(parse_command("list").unwrap(), Some(ControlCommand::List));
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("# note").unwrap(), None);
        assert!(parse_command("set").is_err());
        assert!(parse_command("set u_speed").is_err());
        assert!(parse_command("jump 3").is_err());
    }

    #[test]
    fn values_follow_the_declared_type() {
        assert_eq!(
            value_from_args(GlslType::Vec3, &args(&["1", "0.5", "0"])).unwrap(),
            UniformValue::Vector(vec![1.0, 0.5, 0.0])
        );
        assert_eq!(
            value_from_args(GlslType::Int, &args(&["-3"])).unwrap(),
            UniformValue::Int(-3)
        );
        assert_eq!(
            value_from_args(GlslType::Bool, &args(&["on"])).unwrap(),
            UniformValue::Bool(true)
        );
        assert!(value_from_args(GlslType::Vec2, &args(&["1"])).is_err());
        assert!(value_from_args(GlslType::Int, &args(&["1.5"])).is_err());
        assert!(value_from_args(GlslType::Float, &args(&["fast"])).is_err());
    }

    #[test]
    fn set_values_are_clamped_by_the_registry() {
        let mut registry = registry();
        let value = value_from_args(GlslType::Float, &args(&["99"])).unwrap();
        registry.set("u_speed", value).unwrap();
        assert_eq!(registry.value("u_speed"), Some(&UniformValue::Float(10.0)));
    }

    #[test]
    fn nudging_uses_the_control_step() {
        let registry = registry();
        let spec = registry.control_for("u_speed").unwrap();
        let Some(UniformValue::Float(raised)) = nudged(&UniformValue::Float(1.0), spec, true) else {
            panic!("slider nudge should yield a float");
        };
        assert!((raised - 1.01).abs() < 1e-6);
        let spec = registry.control_for("u_on").unwrap();
        assert_eq!(
            nudged(&UniformValue::Bool(false), spec, false),
            Some(UniformValue::Bool(true))
        );
        let spec = registry.control_for("u_tint").unwrap();
        assert_eq!(nudged(&UniformValue::Vector(vec![0.0; 3]), spec, true), None);
    }

    #[test]
    fn selection_cycles_in_declaration_order() {
        let registry = registry();
        assert_eq!(next_selection(&registry, None).as_deref(), Some("u_speed"));
        assert_eq!(
            next_selection(&registry, Some("u_speed")).as_deref(),
            Some("u_tint")
        );
        assert_eq!(
            next_selection(&registry, Some("u_on")).as_deref(),
            Some("u_speed")
        );
        assert_eq!(
            next_selection(&registry, Some("u_gone")).as_deref(),
            Some("u_speed")
        );
        assert_eq!(next_selection(&UniformRegistry::default(), None), None);
    }

    #[test]
    fn description_names_the_control() {
        let lines = describe(&registry());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("u_speed"));
        assert!(lines[0].contains("slider -10..10 step 0.01"));
        assert!(lines[1].contains("color (3)"));
        assert!(lines[2].ends_with("input"));
    }
}
