use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::synth::DEBUG_VALUE_RANGE;

/// Decodes a debug pixel written by the injected `_fragpad_encode`.
pub fn decode_debug_pixel(pixel: [u8; 4]) -> f32 {
    let [r, g, b, a] = pixel.map(f64::from);
    let base = 255.0_f64;
    let unit = r / base + g / base.powi(2) + b / base.powi(3) + a / base.powi(4);
    let range = f64::from(DEBUG_VALUE_RANGE);
    (unit * 2.0 * range - range) as f32
}

/// Host-side mirror of the shader encoder.
#[cfg(test)]
pub(crate) fn encode_debug_value(value: f32) -> [u8; 4] {
    let range = f64::from(DEBUG_VALUE_RANGE);
    let mut rest = ((f64::from(value) + range) / (2.0 * range)).clamp(0.0, 0.999_999);
    let mut out = [0u8; 4];
    for byte in &mut out {
        rest *= 255.0;
        let digit = rest.floor();
        *byte = digit as u8;
        rest -= digit;
    }
    out
}

/// A printed value read back after a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugValue {
    pub label: String,
    pub value: f32,
}

impl fmt::Display for DebugValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2}", self.label, self.value)
    }
}

/// Receives decoded debug values once per rendered frame.
pub trait DebugSink {
    fn publish(&mut self, values: &[DebugValue]);
}

/// Keeps the most recent frame's values.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    latest: Vec<DebugValue>,
    frames: usize,
}

impl CollectingSink {
    pub fn latest(&self) -> &[DebugValue] {
        &self.latest
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// `label: value` lines, one per site.
    pub fn lines(&self) -> Vec<String> {
        self.latest.iter().map(ToString::to_string).collect()
    }
}

impl DebugSink for CollectingSink {
    fn publish(&mut self, values: &[DebugValue]) {
        self.latest = values.to_vec();
        self.frames += 1;
    }
}

/// Logs values whenever they change, to avoid flooding the log every frame.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    last: Vec<DebugValue>,
}

impl DebugSink for TracingSink {
    fn publish(&mut self, values: &[DebugValue]) {
        if values == self.last.as_slice() {
            return;
        }
        for value in values {
            info!(target: "fragpad::debug", label = %value.label, value = value.value, "{value}");
        }
        self.last = values.to_vec();
    }
}
