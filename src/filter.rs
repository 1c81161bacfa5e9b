//! Element selection. Nothing here mutates an element; each function picks a
//! subset of what extraction returned.

use tracing::debug;

use crate::types::WebElement;

/// Drop controls the automation must never touch: disabled inputs, and the
/// button that triggers the automation itself (clicking it would start
/// another run from inside this one).
pub fn valid_elements(elements: &[WebElement], trigger_id: &str) -> Vec<WebElement> {
    let valid: Vec<WebElement> = elements
        .iter()
        .filter(|element| match element {
            WebElement::Input { disabled, .. } => !disabled,
            WebElement::Button { .. } => element.id() != Some(trigger_id),
        })
        .cloned()
        .collect();
    debug!(
        kept = valid.len(),
        dropped = elements.len() - valid.len(),
        "filtered invalid elements"
    );
    valid
}

pub fn input_fields(elements: &[WebElement]) -> Vec<WebElement> {
    elements.iter().filter(|e| e.is_input()).cloned().collect()
}

pub fn buttons(elements: &[WebElement]) -> Vec<WebElement> {
    elements.iter().filter(|e| e.is_button()).cloned().collect()
}
