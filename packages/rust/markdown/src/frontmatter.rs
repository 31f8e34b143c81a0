//! YAML front-matter extraction.

use serde_json::{Map, Value};

use citegraph_shared::{CitegraphError, Result};

/// Split a leading `---` block off `input` and parse it into a JSON object map.
///
/// Returns `Ok(None)` when the document has no front matter at all. The block
/// is closed by a `---` or `...` line; an unterminated block is an error.
pub(crate) fn extract_frontmatter(input: &str) -> Result<Option<Map<String, Value>>> {
    let mut lines = input.lines();

    let Some(first) = lines.next() else {
        return Ok(None);
    };
    if first.trim_start_matches('\u{feff}').trim_end() != "---" {
        return Ok(None);
    }

    let mut yaml_lines: Vec<&str> = Vec::new();
    let mut closed = false;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            closed = true;
            break;
        }
        yaml_lines.push(line);
    }

    if !closed {
        return Err(CitegraphError::parse("unterminated front matter block"));
    }

    parse_yaml_map(&yaml_lines.join("\n")).map(Some)
}

/// Parse YAML into a JSON object map via `serde_yaml`.
fn parse_yaml_map(yaml: &str) -> Result<Map<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| CitegraphError::parse(format!("invalid YAML front matter: {e}")))?;
    let json_value = serde_json::to_value(yaml_value)
        .map_err(|e| CitegraphError::parse(format!("front matter is not JSON-compatible: {e}")))?;

    match json_value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(CitegraphError::parse(format!(
            "front matter must be a mapping, got {other}"
        ))),
    }
}
