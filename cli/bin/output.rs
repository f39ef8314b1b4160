// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rendering of inventory sections as text, JSON or YAML.

use crate::cmdline::Format;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml encoding failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Render `value` in the requested format.
///
/// Serialized forms are keyed by `name` (`{"cpu": {...}}`), so that sections can be told apart
/// when several outputs are concatenated.
pub fn render<T: Serialize + Display>(
    name: &str,
    value: &T,
    format: Format,
    pretty: bool,
) -> Result<String, RenderError> {
    let keyed = BTreeMap::from([(name, value)]);
    let rendered = match format {
        Format::Text => value.to_string(),
        Format::Json if pretty => serde_json::to_string_pretty(&keyed)?,
        Format::Json => serde_json::to_string(&keyed)?,
        Format::Yaml => serde_yaml_ng::to_string(&keyed)?,
    };
    Ok(rendered.trim_end().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use hardware::memory::MemoryInfo;
    use hardware::{Context, Discover, Options};
    use pretty_assertions::assert_eq;
    use test_utils::host;

    fn memory() -> MemoryInfo {
        let root = host::sample_host();
        let ctx = Context::new(Options::default().with_chroot(root.path()));
        MemoryInfo::discover(&ctx).unwrap()
    }

    #[test]
    fn text_is_the_summary_line() {
        let memory = memory();
        assert_eq!(
            render("memory", &memory, Format::Text, false).unwrap(),
            memory.to_string().trim_end()
        );
    }

    #[test]
    fn serialized_forms_are_keyed_by_section() {
        let memory = memory();
        let json = render("memory", &memory, Format::Json, false).unwrap();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["memory"], serde_json::to_value(&memory).unwrap());

        let pretty = render("memory", &memory, Format::Json, true).unwrap();
        assert!(pretty.starts_with("{\n  \"memory\""));

        let yaml = render("memory", &memory, Format::Yaml, false).unwrap();
        assert!(yaml.starts_with("memory:"));
        let decoded: BTreeMap<String, MemoryInfo> = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(decoded["memory"], memory);
    }
}
