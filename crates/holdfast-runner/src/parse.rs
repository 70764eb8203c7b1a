//! Schema validation of provider text into a typed [`Decision`].
//!
//! Providers return free text that should contain one JSON object:
//!
//! ```json
//! {"action": "buy", "vendor": 1, "item": "food", "quantity": 1, "rationale": "hungry"}
//! ```
//!
//! Parameters may also be nested under a `parameters` object. Recovery
//! strategies for sloppy output are tried in order:
//! 1. Direct `serde_json` deserialization
//! 2. Extract JSON from a markdown code block
//! 3. Strip trailing commas and retry
//! 4. The outermost `{ ... }` span
//!
//! Anything that survives extraction is then checked: the action must be
//! known, its required parameters present, item names valid, and
//! quantities within `1..=MAX_QUANTITY`. Failure is a [`ParseError`], which
//! the orchestrator answers with a fallback decision.

use holdfast_types::{Action, ActionType, Decision, Item, MAX_QUANTITY};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Longest rationale kept, in characters.
pub const MAX_RATIONALE_CHARS: usize = 500;

/// Parse and validate provider text.
pub fn parse_decision(raw: &str) -> Result<Decision, ParseError> {
    let mut object = extract_object(raw)?;
    flatten_parameters(&mut object);

    let name = object
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned();
    let action_type = parse_action_type(&name).ok_or(ParseError::UnknownAction { action: name })?;

    for &parameter in required_parameters(action_type) {
        if object.get(parameter).is_none_or(Value::is_null) {
            return Err(ParseError::MissingParameter {
                action: action_type.as_str(),
                parameter,
            });
        }
    }
    normalize_items(&mut object)?;
    check_quantities(&object)?;

    let rationale: String = object
        .remove("rationale")
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_default()
        .chars()
        .take(MAX_RATIONALE_CHARS)
        .collect();
    object.insert(
        "action".to_owned(),
        Value::String(action_type.as_str().to_owned()),
    );

    let action: Action = serde_json::from_value(Value::Object(object)).map_err(|e| {
        ParseError::InvalidParameters {
            detail: e.to_string(),
        }
    })?;
    Ok(Decision::new(action, rationale))
}

/// Render a decision in the wire form [`parse_decision`] accepts.
pub fn render_decision(decision: &Decision) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(&decision.action)?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "rationale".to_owned(),
            Value::String(decision.rationale.clone()),
        );
    }
    serde_json::to_string(&value)
}

/// Parameters each action must carry.
pub const fn required_parameters(action: ActionType) -> &'static [&'static str] {
    match action {
        ActionType::Move => &["to"],
        ActionType::Gather => &["spawn"],
        ActionType::Consume => &["item", "quantity"],
        ActionType::Buy => &["vendor", "item", "quantity"],
        ActionType::Trade => &[
            "partner",
            "give",
            "give_quantity",
            "receive",
            "receive_quantity",
        ],
        ActionType::Work => &["contract"],
        ActionType::Sleep | ActionType::Explore | ActionType::Idle => &[],
    }
}

fn parse_action_type(name: &str) -> Option<ActionType> {
    ActionType::ALL
        .iter()
        .copied()
        .find(|t| t.as_str().eq_ignore_ascii_case(name))
}

fn normalize_items(object: &mut Map<String, Value>) -> Result<(), ParseError> {
    for key in ["item", "give", "receive"] {
        let Some(value) = object.get_mut(key) else {
            continue;
        };
        let item = value
            .as_str()
            .and_then(Item::parse)
            .ok_or_else(|| ParseError::InvalidParameters {
                detail: format!("{key} must name an item, got {value}"),
            })?;
        *value = Value::String(item.as_str().to_owned());
    }
    Ok(())
}

fn check_quantities(object: &Map<String, Value>) -> Result<(), ParseError> {
    for parameter in ["quantity", "give_quantity", "receive_quantity"] {
        let Some(value) = object.get(parameter) else {
            continue;
        };
        let in_range = value
            .as_u64()
            .is_some_and(|q| q >= 1 && q <= u64::from(MAX_QUANTITY));
        if !in_range {
            return Err(ParseError::OutOfRange {
                parameter,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Lift fields of a nested `parameters` object to the top level.
fn flatten_parameters(object: &mut Map<String, Value>) {
    if let Some(Value::Object(parameters)) = object.remove("parameters") {
        for (key, value) in parameters {
            object.entry(key).or_insert(value);
        }
    }
    if !object.contains_key("action")
        && let Some(value) = object.remove("action_type")
    {
        object.insert("action".to_owned(), value);
    }
}

/// Recover a JSON object from provider text.
fn extract_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = raw.trim();
    let block = extract_json_from_codeblock(trimmed);
    let span = outermost_braces(trimmed);

    let candidates = [
        Some(trimmed.to_owned()),
        block.map(ToOwned::to_owned),
        Some(strip_trailing_commas(trimmed)),
        block.map(strip_trailing_commas),
        span.map(strip_trailing_commas),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
            return Ok(map);
        }
    }

    let detail: String = trimmed.chars().take(120).collect();
    Err(ParseError::NotJson { detail })
}

/// Extract the body of the first markdown code block.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let fence = text.find("```")?;
    let after_fence = fence.checked_add(3)?;
    let rest = text.get(after_fence..)?;
    let body_start = rest.find('\n').and_then(|nl| nl.checked_add(1))?;
    let body = rest.get(body_start..)?;
    let end = body.find("```")?;
    body.get(..end).map(str::trim)
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    let end = end.checked_add(1)?;
    text.get(start..end)
}

/// Strip trailing commas before closing braces and brackets.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    for (i, c) in chars.iter().copied().enumerate() {
        if c == ',' {
            let next = chars
                .iter()
                .skip(i.saturating_add(1))
                .find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        result.push(c);
    }
    result
}
