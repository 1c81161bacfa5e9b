//! Turning agent replies into action chains.
//!
//! Agents package list answers three ways: a bare array, an object holding
//! the array under some key, or (for a one-item answer) the item itself.
//! `ReplyShape` resolves that once so everything downstream sees a plain list.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{PilotError, Result};
use crate::types::{ActionStep, ButtonClassification, FieldMapping, Purpose, WebElement};

/// Key the field-mapping prompt asks the agent to wrap its array in.
const RESULT_KEY: &str = "result";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyShape {
    Bare(Vec<Value>),
    Wrapped { key: String, items: Vec<Value> },
    Single(Map<String, Value>),
}

impl ReplyShape {
    /// Classify a parsed reply. An object counts as a single item only if it
    /// has every key in `item_keys`.
    pub fn resolve(reply: Value, item_keys: &[&str]) -> Result<Self> {
        match reply {
            Value::Array(items) => Ok(ReplyShape::Bare(items)),
            Value::Object(mut map) => {
                let key = if map.get(RESULT_KEY).is_some_and(Value::is_array) {
                    Some(RESULT_KEY.to_string())
                } else {
                    map.iter().find(|(_, v)| v.is_array()).map(|(k, _)| k.clone())
                };
                if let Some(key) = key {
                    if let Some(Value::Array(items)) = map.remove(&key) {
                        return Ok(ReplyShape::Wrapped { key, items });
                    }
                }
                if item_keys.iter().all(|k| map.contains_key(*k)) {
                    return Ok(ReplyShape::Single(map));
                }
                Err(PilotError::ResponseShapeError(format!(
                    "object has no array property and is not a single {{{}}} item",
                    item_keys.join(", ")
                )))
            }
            other => Err(PilotError::ResponseShapeError(format!(
                "expected an array or an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn into_items(self) -> Vec<Value> {
        match self {
            ReplyShape::Bare(items) | ReplyShape::Wrapped { items, .. } => items,
            ReplyShape::Single(map) => vec![Value::Object(map)],
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Field values are strings on the page; numbers and booleans are
/// stringified, anything else is unusable.
fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read the field-mapping reply into id -> value.
pub fn field_mapping(reply: Value) -> Result<FieldMapping> {
    let items = ReplyShape::resolve(reply, &["id", "value"])?.into_items();
    let mapping: FieldMapping = items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let value = field_value(item.get("value")?)?;
            Some((id.to_string(), value))
        })
        .collect();
    debug!(entries = mapping.len(), "field mapping parsed");
    Ok(mapping)
}

/// One `Fill` per input the agent gave a non-empty value for, in page order.
/// Inputs without a value (or without an id) get no step.
pub fn build_input_chain(inputs: &[WebElement], mapping: &FieldMapping) -> Vec<ActionStep> {
    inputs
        .iter()
        .filter(|element| element.is_input())
        .filter_map(|element| {
            let id = element.id()?;
            let value = mapping.value_for(id).filter(|v| !v.is_empty())?;
            Some(ActionStep::fill(id, value))
        })
        .collect()
}

/// Read the button-classification reply. Items without a string id or with a
/// purpose other than `submit`/`additional_action` are skipped.
pub fn button_classifications(reply: Value) -> Result<Vec<ButtonClassification>> {
    let shape = ReplyShape::resolve(reply, &["id", "purpose"])?;
    if let ReplyShape::Wrapped { key, .. } = &shape {
        debug!(key = %key, "button classifications wrapped in an object");
    }

    let classifications = shape
        .into_items()
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let raw = item.get("purpose")?.as_str()?;
            match Purpose::parse(raw) {
                Some(purpose) => Some(ButtonClassification {
                    id: id.to_string(),
                    purpose,
                }),
                None => {
                    warn!(id, purpose = raw, "ignoring button with unknown purpose");
                    None
                }
            }
        })
        .collect();
    Ok(classifications)
}

/// Clicks planned for one scope.
///
/// `additional` are explored first; `submit` is clicked last. The agent is
/// asked for exactly one submit but is not trusted to comply: with several,
/// the first in page order wins and the rest land in `extra_submits`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonPlan {
    pub additional: Vec<ActionStep>,
    pub submit: Option<ActionStep>,
    pub extra_submits: Vec<String>,
}

/// Normalize the classification reply and plan the clicks for `buttons`.
pub fn build_button_chain(buttons: &[WebElement], reply: Value) -> Result<ButtonPlan> {
    let classifications = button_classifications(reply)?;
    Ok(plan_buttons(buttons, &classifications))
}

pub fn plan_buttons(buttons: &[WebElement], classifications: &[ButtonClassification]) -> ButtonPlan {
    let known: HashSet<&str> = buttons.iter().filter_map(WebElement::id).collect();

    let mut purposes: HashMap<&str, Purpose> = HashMap::new();
    for classification in classifications {
        if known.contains(classification.id.as_str()) {
            purposes.insert(&classification.id, classification.purpose);
        } else {
            warn!(id = %classification.id, "agent classified a button that is not in this scope");
        }
    }

    let mut plan = ButtonPlan::default();
    let mut seen = HashSet::new();
    for id in buttons.iter().filter_map(WebElement::id) {
        if !seen.insert(id) {
            continue;
        }
        match purposes.get(id) {
            Some(Purpose::AdditionalAction) => {
                plan.additional.push(ActionStep::click(id, Purpose::AdditionalAction));
            }
            Some(Purpose::Submit) if plan.submit.is_none() => {
                plan.submit = Some(ActionStep::click(id, Purpose::Submit));
            }
            Some(Purpose::Submit) => plan.extra_submits.push(id.to_string()),
            None => debug!(id, "button left unclassified, not clicking"),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buttons() -> Vec<WebElement> {
        vec![
            WebElement::button("paperApplyBtn"),
            WebElement::button("submitBtn"),
        ]
    }

    #[test]
    fn test_three_shapes_are_equivalent() {
        let bare = json!([
            {"tag": "button", "id": "paperApplyBtn", "disabled": false, "purpose": "additional_action"},
            {"tag": "button", "id": "submitBtn", "disabled": false, "purpose": "submit"}
        ]);
        let wrapped = json!({"buttons": bare.clone()});
        let expected = build_button_chain(&buttons(), bare).unwrap();
        assert_eq!(build_button_chain(&buttons(), wrapped).unwrap(), expected);
        assert_eq!(expected.additional, vec![ActionStep::click("paperApplyBtn", Purpose::AdditionalAction)]);
        assert_eq!(expected.submit, Some(ActionStep::click("submitBtn", Purpose::Submit)));

        let single = json!({"id": "submitBtn", "purpose": "submit"});
        let only_submit = build_button_chain(&buttons(), single).unwrap();
        let same_as_array =
            build_button_chain(&buttons(), json!([{"id": "submitBtn", "purpose": "submit"}])).unwrap();
        assert_eq!(only_submit, same_as_array);
    }

    #[test]
    fn test_other_shapes_are_rejected() {
        for reply in [json!("submitBtn"), json!(42), json!(null), json!({"note": "no list"})] {
            let err = build_button_chain(&buttons(), reply).unwrap_err();
            assert!(matches!(err, PilotError::ResponseShapeError(_)), "{err:?}");
        }
    }

    #[test]
    fn test_wrapped_prefers_result_key() {
        let reply = json!({"extra": [1, 2], "result": [{"id": "x", "value": "y"}]});
        match ReplyShape::resolve(reply, &["id", "value"]).unwrap() {
            ReplyShape::Wrapped { key, items } => {
                assert_eq!(key, "result");
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_wrapped_takes_first_array_property() {
        let reply = json!({"zeta": [{"id": "submitBtn", "purpose": "submit"}], "alpha": []});
        match ReplyShape::resolve(reply, &["id", "purpose"]).unwrap() {
            ReplyShape::Wrapped { key, .. } => assert_eq!(key, "zeta"),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_input_chain_skips_unmapped_and_empty() {
        let inputs = vec![
            WebElement::input("userName", "text"),
            WebElement::input("age", "number"),
            WebElement::input("gender", "text"),
            WebElement::Input {
                id: None,
                input_type: "text".to_string(),
                disabled: false,
            },
        ];
        let mapping = field_mapping(json!({"result": [
            {"id": "userName", "value": "Ana"},
            {"id": "age", "value": 30},
            {"id": "gender", "value": ""},
            {"id": "unknown", "value": "x"}
        ]}))
        .unwrap();

        let chain = build_input_chain(&inputs, &mapping);
        assert_eq!(
            chain,
            vec![ActionStep::fill("userName", "Ana"), ActionStep::fill("age", "30")]
        );
    }

    #[test]
    fn test_field_mapping_duplicate_id_last_wins() {
        let mapping = field_mapping(json!({"result": [
            {"id": "userName", "value": "Ana"},
            {"id": "userName", "value": "Ana Lima"}
        ]}))
        .unwrap();
        assert_eq!(mapping.value_for("userName"), Some("Ana Lima"));
    }

    #[test]
    fn test_field_mapping_rejects_text() {
        assert!(matches!(
            field_mapping(json!("userName=Ana")),
            Err(PilotError::ResponseShapeError(_))
        ));
    }

    #[test]
    fn test_multiple_submits_first_in_page_order_wins() {
        let buttons = vec![
            WebElement::button("saveDraftBtn"),
            WebElement::button("submitBtn"),
            WebElement::button("helpBtn"),
        ];
        let classifications = vec![
            ButtonClassification { id: "submitBtn".into(), purpose: Purpose::Submit },
            ButtonClassification { id: "saveDraftBtn".into(), purpose: Purpose::Submit },
            ButtonClassification { id: "helpBtn".into(), purpose: Purpose::AdditionalAction },
        ];
        let plan = plan_buttons(&buttons, &classifications);
        assert_eq!(plan.submit, Some(ActionStep::click("saveDraftBtn", Purpose::Submit)));
        assert_eq!(plan.extra_submits, vec!["submitBtn".to_string()]);
        assert_eq!(plan.additional, vec![ActionStep::click("helpBtn", Purpose::AdditionalAction)]);
    }

    #[test]
    fn test_unknown_and_unclassified_buttons_are_not_clicked() {
        let classifications = vec![
            ButtonClassification { id: "ghostBtn".into(), purpose: Purpose::AdditionalAction },
            ButtonClassification { id: "submitBtn".into(), purpose: Purpose::Submit },
        ];
        let plan = plan_buttons(&buttons(), &classifications);
        assert!(plan.additional.is_empty());
        assert_eq!(plan.submit, Some(ActionStep::click("submitBtn", Purpose::Submit)));
    }

    #[test]
    fn test_unknown_purpose_is_skipped() {
        let parsed = button_classifications(json!([
            {"id": "closeBtn", "purpose": "dismiss"},
            {"id": "submitBtn", "purpose": "SUBMIT"}
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            vec![ButtonClassification { id: "submitBtn".into(), purpose: Purpose::Submit }]
        );
    }
}
