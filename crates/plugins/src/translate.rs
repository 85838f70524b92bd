//! Agent header translation from the source plugin schema to the target schema.
//!
//! The mapping lives in [`FIELD_TABLE`]: each row names a source key, the
//! target key it feeds, and the value transform. Rows are applied in table
//! order and the first source key to set a target key wins.

use {
    plugport_config::ExtensionFields,
    serde_yaml::{Mapping, Value},
};

use crate::error::TranslationError;

/// Value-shape conversion applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Scalar to string.
    Text,
    /// Comma-separated string or sequence of strings to a sequence of trimmed tokens.
    List,
    /// Model name; `inherit` means "use the default" and is dropped.
    ModelHint,
    /// Integer or numeric string.
    Integer,
}

/// One row of the translation table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub source: &'static str,
    pub target: &'static str,
    pub transform: Transform,
}

const fn rule(source: &'static str, target: &'static str, transform: Transform) -> FieldRule {
    FieldRule {
        source,
        target,
        transform,
    }
}

/// Source → target field mapping.
pub const FIELD_TABLE: &[FieldRule] = &[
    rule("name", "name", Transform::Text),
    rule("description", "description", Transform::Text),
    rule("when_to_use", "description", Transform::Text),
    rule("whenToUse", "description", Transform::Text),
    rule("tools", "tools", Transform::List),
    rule("allowed-tools", "tools", Transform::List),
    rule("allowedTools", "tools", Transform::List),
    rule("disallowedTools", "disallowed_tools", Transform::List),
    rule("disallowed-tools", "disallowed_tools", Transform::List),
    rule("model", "model", Transform::ModelHint),
    rule("permissionMode", "permission_mode", Transform::Text),
    rule("permission-mode", "permission_mode", Transform::Text),
    rule("skills", "skills", Transform::List),
    rule("maxTurns", "max_turns", Transform::Integer),
    rule("max-turns", "max_turns", Transform::Integer),
];

/// Target fields every translated header must carry.
pub const REQUIRED_FIELDS: &[&str] = &["name"];

/// Non-fatal translation notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationWarning {
    /// Source key unknown to the table, dropped under [`ExtensionFields::Drop`].
    UnsupportedField { field: String },
    /// Alias ignored because an earlier key already set the target.
    ShadowedField { field: String, target: String },
}

impl std::fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedField { field } => write!(f, "dropped unsupported field '{field}'"),
            Self::ShadowedField { field, target } => {
                write!(f, "ignored field '{field}': '{target}' already set")
            },
        }
    }
}

/// A translated header with the warnings produced along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub header: Mapping,
    pub warnings: Vec<TranslationWarning>,
}

/// Translate one source header into the target schema. Pure.
pub fn translate_header(
    source: &Mapping,
    extension_fields: ExtensionFields,
) -> Result<Translation, TranslationError> {
    let mut header = Mapping::new();
    let mut warnings = Vec::new();

    for rule in FIELD_TABLE {
        let Some(value) = source.get(rule.source) else {
            continue;
        };
        let Some(converted) = convert(rule, value)? else {
            continue;
        };
        if header.contains_key(rule.target) {
            warnings.push(TranslationWarning::ShadowedField {
                field: rule.source.to_string(),
                target: rule.target.to_string(),
            });
            continue;
        }
        header.insert(Value::from(rule.target), converted);
    }

    for (key, value) in source {
        let field = match key {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
        };
        if FIELD_TABLE.iter().any(|r| r.source == field) {
            continue;
        }
        match extension_fields {
            ExtensionFields::Keep if !header.contains_key(key) => {
                header.insert(key.clone(), value.clone());
            },
            _ => warnings.push(TranslationWarning::UnsupportedField { field }),
        }
    }

    if let Some(field) = REQUIRED_FIELDS
        .iter()
        .copied()
        .find(|f| !header.contains_key(*f))
    {
        return Err(TranslationError::MissingRequiredField { field });
    }

    Ok(Translation { header, warnings })
}

/// Apply a rule's transform. `Ok(None)` means "treat as absent".
fn convert(rule: &FieldRule, value: &Value) -> Result<Option<Value>, TranslationError> {
    let invalid = |expected: &'static str| TranslationError::InvalidValue {
        field: rule.source.to_string(),
        expected,
    };

    if value.is_null() {
        return Ok(None);
    }

    match rule.transform {
        Transform::Text => scalar_text(value)
            .map(|s| Some(Value::String(s)))
            .ok_or_else(|| invalid("a string")),
        Transform::ModelHint => {
            let model = scalar_text(value).ok_or_else(|| invalid("a string"))?;
            let model = model.trim();
            if model.is_empty() || model.eq_ignore_ascii_case("inherit") {
                Ok(None)
            } else {
                Ok(Some(Value::String(model.to_string())))
            }
        },
        Transform::List => {
            let tokens: Vec<String> = match value {
                Value::String(s) => s
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect(),
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(|s| s.trim().to_string())
                            .ok_or_else(|| invalid("a list of strings"))
                    })
                    .filter(|t| t.as_ref().map_or(true, |s| !s.is_empty()))
                    .collect::<Result<_, _>>()?,
                _ => return Err(invalid("a string or a list of strings")),
            };
            Ok(Some(Value::Sequence(
                tokens.into_iter().map(Value::String).collect(),
            )))
        },
        Transform::Integer => {
            let number = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            number
                .map(|n| Some(Value::from(n)))
                .ok_or_else(|| invalid("an integer"))
        },
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
