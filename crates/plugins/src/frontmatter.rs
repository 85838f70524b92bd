//! Header reader for markdown files with YAML frontmatter.
//!
//! The header is the block between an opening `---` line and the next line
//! consisting solely of `---`. Everything after the closing line is the body
//! and is kept byte-for-byte.

use serde_yaml::{Mapping, Value};

use crate::{error::TranslationError, types::AgentDefinition};

const DELIMITER: &str = "---";

/// Split `content` into raw header text and body.
///
/// Returns `Ok(None)` when the file has no frontmatter at all.
pub fn split(content: &str) -> Result<Option<(&str, &str)>, TranslationError> {
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    if first.trim_end() != DELIMITER || !first.ends_with('\n') {
        return Ok(None);
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &content[header_start..offset];
            let body = &content[offset + line.len()..];
            return Ok(Some((header, body)));
        }
        offset += line.len();
    }

    Err(TranslationError::InvalidHeader {
        reason: "missing closing --- for frontmatter".into(),
    })
}

/// Parse a markdown document into header mapping and body.
pub fn parse(content: &str) -> Result<AgentDefinition, TranslationError> {
    let Some((raw, body)) = split(content)? else {
        return Ok(AgentDefinition {
            header: Mapping::new(),
            body: content.to_string(),
        });
    };

    let header = match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(map)) => map,
        Ok(Value::Null) => Mapping::new(),
        Ok(_) => {
            return Err(TranslationError::InvalidHeader {
                reason: "frontmatter is not a mapping".into(),
            });
        },
        Err(e) => {
            return Err(TranslationError::InvalidHeader {
                reason: e.to_string(),
            });
        },
    };

    Ok(AgentDefinition {
        header,
        body: body.to_string(),
    })
}

/// Render a header and body back into a markdown document.
pub fn render(definition: &AgentDefinition) -> Result<String, TranslationError> {
    let header = if definition.header.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(&definition.header).map_err(|e| {
            TranslationError::InvalidHeader {
                reason: e.to_string(),
            }
        })?
    };
    Ok(format!("{DELIMITER}\n{header}{DELIMITER}\n{}", definition.body))
}

/// Read a string-valued `name` from a header, if present.
pub fn header_name(header: &Mapping) -> Option<&str> {
    header
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
}
