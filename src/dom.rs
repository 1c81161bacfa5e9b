use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PilotError, Result};
use crate::hands::PageDriver;
use crate::types::{INTERACTIVE_SELECTOR, Scope, WebElement};

/// Rendered-on-screen test shared by the injected scripts: not `display:none`,
/// not `visibility:hidden`, and a non-empty box.
const IS_VISIBLE_FN: &str = r#"
  function isVisible(el) {
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  }
"#;

/// Called on the element being filled, before typing.
pub const CLEAR_VALUE_FN: &str = "function () { this.value = ''; }";

/// JavaScript that returns a JSON string describing every visible element
/// matching `selector` under `scope` (the document when `None`).
///
/// Only `input` and `button` tags are reported. A missing scope root yields
/// `[]`.
pub fn extraction_script(scope: Option<&str>, selector: &str) -> String {
    let scope_js = serde_json::to_string(&scope).unwrap_or_else(|_| "null".to_string());
    let selector_js = serde_json::to_string(selector).unwrap_or_else(|_| "''".to_string());
    format!(
        r#"
(() => {{
  {IS_VISIBLE_FN}
  const scopeSelector = {scope_js};
  const root = scopeSelector === null ? document : document.querySelector(scopeSelector);
  if (!root) return '[]';
  const out = [];
  for (const el of root.querySelectorAll({selector_js})) {{
    if (!isVisible(el)) continue;
    const tag = el.tagName.toLowerCase();
    if (tag === 'input') {{
      out.push({{ tag, id: el.id || null, type: el.type || 'text', disabled: !!el.disabled }});
    }} else if (tag === 'button') {{
      out.push({{ tag, id: el.id || null, disabled: !!el.disabled }});
    }}
  }}
  return JSON.stringify(out);
}})()
"#
    )
}

/// JavaScript that evaluates to `true` once `selector` is visible.
pub fn visibility_probe(selector: &str) -> String {
    let selector_js = serde_json::to_string(selector).unwrap_or_else(|_| "''".to_string());
    format!(
        r#"
(() => {{
  {IS_VISIBLE_FN}
  const el = document.querySelector({selector_js});
  return !!el && isVisible(el);
}})()
"#
    )
}

pub fn parse_elements(raw: &str) -> Result<Vec<WebElement>> {
    serde_json::from_str(raw)
        .map_err(|e| PilotError::browser(format!("extraction returned unreadable data: {e}")))
}

/// Extract the visible interactive controls of one scope.
///
/// For a dialog scope this first waits up to `timeout` for the dialog to show.
/// A dialog that never shows is not an error: there is simply nothing to do,
/// so an empty list comes back.
pub async fn extract_elements(
    page: &dyn PageDriver,
    scope: &Scope,
    timeout: Duration,
) -> Result<Vec<WebElement>> {
    if let Some(selector) = scope.selector() {
        match page.wait_for_visible(selector, timeout).await {
            Ok(()) => debug!(%scope, "scope is visible"),
            Err(PilotError::ExtractionTimeout { timeout_ms, .. }) => {
                info!(%scope, timeout_ms, "scope never became visible, nothing to extract");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
    }

    let elements = page
        .query_visible(scope.selector(), INTERACTIVE_SELECTOR)
        .await?;
    info!(%scope, count = elements.len(), "extracted interactive elements");
    Ok(elements)
}
