//! Fills the template render script with per-pattern values.
//!
//! The template is a Python script run inside the renderer. It carries `__NAME_PLACEHOLDER__`
//! markers which are replaced verbatim; list values are written as Python literals.

use std::path::Path;
use crate::config::{Config, Preset};
use crate::swatch::Color;

pub const PATTERN: &str = "__PATTERN_PLACEHOLDER__";
pub const PATTERN_BASE: &str = "__PATTERN_BASE_PLACEHOLDER__";
pub const ENGINE: &str = "__ENGINE_PLACEHOLDER__";
pub const SAMPLES: &str = "__SAMPLES_PLACEHOLDER__";
pub const SCALE: &str = "__SCALE_PLACEHOLDER__";
pub const OUTPUT_WIDTH: &str = "__OUTPUT_WIDTH_PLACEHOLDER__";
pub const OUTPUT_HEIGHT: &str = "__OUTPUT_HEIGHT_PLACEHOLDER__";
pub const PRESETS: &str = "__PRESETS_PLACEHOLDER__";
pub const CAMERAS: &str = "__CAMERAS_PLACEHOLDER__";
pub const THREADS_COLOR: &str = "__THREADS_COLOR_PLACEHOLDER__";

/// Everything substituted into the template for a single pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptValues {
    pub pattern: String,
    pub pattern_base: String,
    pub engine: &'static str,
    pub samples: u32,
    pub resolution_scale: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub presets: Vec<Preset>,
    pub cameras: Vec<String>,
    pub threads_color: Color,
}

impl ScriptValues {
    pub fn new(config: &Config, pattern: &str, threads_color: Color) -> ScriptValues {
        let pattern_base = Path::new(pattern)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(pattern)
            .to_string();

        ScriptValues {
            pattern: pattern.to_string(),
            pattern_base,
            engine: config.engine.renderer_id(),
            samples: config.samples,
            resolution_scale: config.resolution_scale,
            output_width: config.output_width,
            output_height: config.output_height,
            presets: config.presets.clone(),
            cameras: config.cameras.clone(),
            threads_color,
        }
    }

    fn replacements(&self) -> [(&'static str, String); 10] {
        [
            (PATTERN, self.pattern.clone()),
            (PATTERN_BASE, self.pattern_base.clone()),
            (ENGINE, self.engine.to_string()),
            (SAMPLES, self.samples.to_string()),
            (SCALE, self.resolution_scale.to_string()),
            (OUTPUT_WIDTH, self.output_width.to_string()),
            (OUTPUT_HEIGHT, self.output_height.to_string()),
            (PRESETS, presets_literal(&self.presets)),
            (CAMERAS, tuple_literal(&self.cameras)),
            (THREADS_COLOR, self.threads_color.to_hex()),
        ]
    }
}

/// Returns `template` with every placeholder replaced.
pub fn fill_template(template: &str, values: &ScriptValues) -> String {
    values
        .replacements()
        .iter()
        .fold(template.to_string(), |script, (placeholder, value)| script.replace(placeholder, value))
}

/// A single-quoted Python string literal.
pub fn str_literal(s: &str) -> String {
    let mut literal = String::with_capacity(s.len() + 2);
    literal.push('\'');
    for c in s.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}

/// A Python tuple of strings. One element tuples keep their trailing comma.
pub fn tuple_literal<S: AsRef<str>>(items: &[S]) -> String {
    let items: Vec<String> = items.iter().map(|s| str_literal(s.as_ref())).collect();
    match items.len() {
        1 => format!("({},)", items[0]),
        _ => format!("({})", items.join(", ")),
    }
}

/// A Python list of `[camera, frame]` lists.
pub fn presets_literal(presets: &[Preset]) -> String {
    let items: Vec<String> = presets
        .iter()
        .map(|p| format!("[{}, {}]", str_literal(&p.camera), p.frame))
        .collect();
    format!("[{}]", items.join(", "))
}
