pub mod enhance;
pub mod subscription;
pub mod types;

use std::path::Path;

use serde_json::Value;

use crate::common::error::{MergeError, Result};

pub use types::{MergeOptions, NodeSource, OptionOverrides, OptionsFile, SourceKind};

/// Load a YAML options file, expanding environment variables first.
pub fn load_options(path: &str) -> Result<OptionsFile> {
    let raw = std::fs::read_to_string(Path::new(path))?;
    parse_options(&raw)
}

pub fn parse_options(content: &str) -> Result<OptionsFile> {
    let expanded = enhance::expand_env_vars(content);
    if expanded.trim().is_empty() {
        return Ok(OptionsFile::default());
    }
    serde_yml::from_str(&expanded)
        .map_err(|e| MergeError::Config(format!("invalid options file: {}", e)))
}

/// Parse the sing-box configuration document.
pub fn parse_document(content: &str) -> Result<Value> {
    let doc: Value = serde_json::from_str(content).map_err(|e| {
        MergeError::Document(format!("configuration document is not valid JSON: {}", e))
    })?;
    if !doc.is_object() {
        return Err(MergeError::Document(format!(
            "configuration document must be a JSON object, got {}",
            subscription::json_type_name(&doc)
        )));
    }
    Ok(doc)
}

/// Pretty-print with two-space indentation and a trailing newline.
pub fn render_document(doc: &Value) -> Result<String> {
    let mut out = serde_json::to_string_pretty(doc)
        .map_err(|e| MergeError::Document(format!("failed to serialize document: {}", e)))?;
    out.push('\n');
    Ok(out)
}
