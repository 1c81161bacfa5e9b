use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Selector class every extraction pass queries for.
pub const INTERACTIVE_SELECTOR: &str = "input, button";

/// Longest slice of a raw agent reply carried inside an error message.
pub const AGENT_EXCERPT_MAX_CHARS: usize = 400;

/// The first record returned by the user-data source.
pub type UserRecord = serde_json::Map<String, serde_json::Value>;

/// An interactive control observed on the page.
///
/// Serialized with the same keys the extraction script emits
/// (`{"tag":"input","id":"age","type":"number","disabled":false}`), which is
/// also the shape echoed to the reasoning agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum WebElement {
    Input {
        id: Option<String>,
        #[serde(rename = "type", default = "default_input_type")]
        input_type: String,
        #[serde(default)]
        disabled: bool,
    },
    Button {
        id: Option<String>,
        #[serde(default)]
        disabled: bool,
    },
}

fn default_input_type() -> String {
    "text".to_string()
}

impl WebElement {
    pub fn input(id: &str, input_type: &str) -> Self {
        WebElement::Input {
            id: Some(id.to_string()),
            input_type: input_type.to_string(),
            disabled: false,
        }
    }

    pub fn button(id: &str) -> Self {
        WebElement::Button {
            id: Some(id.to_string()),
            disabled: false,
        }
    }

    pub fn disabled(self) -> Self {
        match self {
            WebElement::Input { id, input_type, .. } => WebElement::Input {
                id,
                input_type,
                disabled: true,
            },
            WebElement::Button { id, .. } => WebElement::Button { id, disabled: true },
        }
    }

    /// DOM id, if the element has a non-empty one.
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            WebElement::Input { id, .. } | WebElement::Button { id, .. } => id.as_deref(),
        };
        id.filter(|id| !id.is_empty())
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            WebElement::Input { disabled, .. } | WebElement::Button { disabled, .. } => *disabled,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, WebElement::Input { .. })
    }

    pub fn is_button(&self) -> bool {
        matches!(self, WebElement::Button { .. })
    }
}

/// Selector used to target an element by DOM id.
pub fn selector_for(id: &str) -> String {
    format!("#{id}")
}

/// What a button does when clicked, as judged by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Submit,
    AdditionalAction,
}

impl Purpose {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "submit" => Some(Purpose::Submit),
            "additional_action" => Some(Purpose::AdditionalAction),
            _ => None,
        }
    }
}

/// One executable step of an action chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionStep {
    Fill { selector: String, value: String },
    Click { selector: String, purpose: Purpose },
}

impl ActionStep {
    pub fn fill(id: &str, value: impl Into<String>) -> Self {
        ActionStep::Fill {
            selector: selector_for(id),
            value: value.into(),
        }
    }

    pub fn click(id: &str, purpose: Purpose) -> Self {
        ActionStep::Click {
            selector: selector_for(id),
            purpose,
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            ActionStep::Fill { selector, .. } | ActionStep::Click { selector, .. } => selector,
        }
    }
}

/// Field id to value, as mapped by the agent. A repeated id overwrites the
/// earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    values: HashMap<String, String>,
}

impl FieldMapping {
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.values.insert(id.into(), value.into());
    }

    pub fn value_for(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut mapping = FieldMapping::default();
        for (id, value) in iter {
            mapping.insert(id, value);
        }
        mapping
    }
}

/// One `{id, purpose}` pair from the button classification reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonClassification {
    pub id: String,
    pub purpose: Purpose,
}

/// Root for one extraction pass: the whole page or a dialog inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Page,
    Modal(String),
}

impl Scope {
    pub fn selector(&self) -> Option<&str> {
        match self {
            Scope::Page => None,
            Scope::Modal(selector) => Some(selector),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Page => write!(f, "page"),
            Scope::Modal(selector) => write!(f, "modal {selector}"),
        }
    }
}
