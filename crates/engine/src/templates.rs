//! API call template rendering.
//!
//! Rendering is two-phase: the static template is serialized to JSON text,
//! `${name}` placeholders are substituted from the step's resolved parameter
//! record, and the text is parsed back into an [`ApiCall`]. Placeholders may
//! therefore sit anywhere in the template (URL, header values, nested body
//! fields) without the renderer knowing the template's shape.
//!
//! Substitution is textual and does not escape: a value carrying a quote can
//! make the rendered text invalid JSON, which surfaces as
//! [`TemplateError::Parse`].

use sb_types::ApiCall;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::resolve::{descend, split_path, value_text};

/// Failure to render a template into a concrete call.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template references unknown parameter '{0}'")]
    UnknownPlaceholder(String),

    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    #[error("invalid placeholder expression '{0}'")]
    InvalidExpression(String),

    #[error("template could not be serialized: {0}")]
    Serialize(serde_json::Error),

    #[error("rendered template is not a valid API call: {0}")]
    Parse(serde_json::Error),
}

/// Structured unresolved placeholder diagnostic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedPlaceholder {
    /// JSON path of the string the placeholder was found in.
    pub source_path: String,
    /// Placeholder expression without delimiters.
    pub expression: String,
}

/// Placeholder occurrence within a text.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Placeholder<'a> {
    start: usize,
    end: usize,
    expression: &'a str,
}

fn scan_placeholders(text: &str) -> Result<Vec<Placeholder<'_>>, TemplateError> {
    let mut placeholders = Vec::new();
    let mut offset = 0;

    while let Some(found) = text[offset..].find("${") {
        let start = offset + found;
        let body_start = start + 2;
        let Some(length) = text[body_start..].find('}') else {
            return Err(TemplateError::Unterminated(start));
        };
        let end = body_start + length + 1;
        placeholders.push(Placeholder {
            start,
            end,
            expression: text[body_start..body_start + length].trim(),
        });
        offset = end;
    }

    Ok(placeholders)
}

/// Extracts placeholder expressions from a string, without delimiters.
pub fn extract_placeholders(text: &str) -> Vec<String> {
    scan_placeholders(text)
        .unwrap_or_default()
        .into_iter()
        .map(|placeholder| placeholder.expression.to_string())
        .collect()
}

fn is_valid_expression(expression: &str) -> bool {
    !expression.is_empty()
        && expression
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '$' | '.' | '[' | ']' | '-'))
        && !expression.starts_with(|character: char| character.is_ascii_digit() || character == '.')
}

fn lookup_parameter<'a>(expression: &str, parameters: &'a Map<String, Value>) -> Option<&'a Value> {
    let segments = split_path(expression);
    let (name, rest) = segments.split_first()?;
    descend(parameters.get(name.as_str())?, rest)
}

/// Substitutes every `${expression}` in `text` from `parameters`.
pub fn render_text(text: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError> {
    let placeholders = scan_placeholders(text)?;
    let mut rendered = String::with_capacity(text.len());
    let mut cursor = 0;

    for placeholder in placeholders {
        if !is_valid_expression(placeholder.expression) {
            return Err(TemplateError::InvalidExpression(placeholder.expression.to_string()));
        }
        let value = lookup_parameter(placeholder.expression, parameters)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(placeholder.expression.to_string()))?;
        rendered.push_str(&text[cursor..placeholder.start]);
        rendered.push_str(&value_text(value));
        cursor = placeholder.end;
    }

    rendered.push_str(&text[cursor..]);
    Ok(rendered)
}

/// Renders a static call template into a concrete [`ApiCall`].
pub fn render_api_call(template: &Value, parameters: &Map<String, Value>) -> Result<ApiCall, TemplateError> {
    let text = serde_json::to_string(template).map_err(TemplateError::Serialize)?;
    let rendered = render_text(&text, parameters)?;
    serde_json::from_str(&rendered).map_err(TemplateError::Parse)
}

/// Renders an auth scope, which may carry placeholders of its own.
pub fn render_scope(scope: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError> {
    render_text(scope, parameters)
}

/// Collects placeholders in `value` that `parameters` cannot satisfy.
pub fn collect_unresolved_placeholders(
    value: &Value,
    source_path: &str,
    parameters: &Map<String, Value>,
    unresolved: &mut Vec<UnresolvedPlaceholder>,
) {
    match value {
        Value::String(raw_text) => {
            for expression in extract_placeholders(raw_text) {
                if lookup_parameter(&expression, parameters).is_none() {
                    unresolved.push(UnresolvedPlaceholder {
                        source_path: source_path.to_string(),
                        expression,
                    });
                }
            }
        }
        Value::Array(values) => {
            for (index, nested_value) in values.iter().enumerate() {
                collect_unresolved_placeholders(nested_value, format!("{source_path}[{index}]").as_str(), parameters, unresolved);
            }
        }
        Value::Object(map) => {
            for (key, nested_value) in map {
                collect_unresolved_placeholders(nested_value, format!("{source_path}.{key}").as_str(), parameters, unresolved);
            }
        }
        _ => {}
    }
}
