use crate::types::{UserRecord, WebElement};

/// A button whose id contains one of these (case-insensitive) is a submit
/// candidate.
pub const SUBMIT_KEYWORDS: [&str; 10] = [
    "submit", "save", "apply", "complete", "send", "finish", "next", "confirm", "ok", "run",
];

/// Ask the agent to map user data onto input fields.
///
/// The reply must be `{"result": [...]}` with one entry per field it could
/// fill. Each entry echoes the field's metadata keys and adds `value`.
pub fn field_mapping_prompt(inputs: &[WebElement], user: &UserRecord) -> String {
    let fields = serde_json::to_string(inputs).unwrap_or_else(|_| "[]".to_string());
    let user = serde_json::to_string(user).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are a form-filling assistant that answers in JSON only.
You receive two JSON documents. The first lists the metadata of the input fields on a web form.
The second holds information about the user who is filling the form.

Map the user information onto the input fields:
- Produce a value for every field you can match by meaning, not by exact spelling.
  A field id "userName" matches a user key such as "name" or "full_name"; "tel" matches "phone".
- Keep ALL original keys of each field object (tag, id, type, disabled) and add ONE new key "value".
- Leave out fields you cannot match. Never invent user data.

Return exactly one JSON object with a single array named "result":
{{"result": [{{"tag": "input", "id": "<field id>", "type": "<field type>", "disabled": false, "value": "<value>"}}]}}

Input field metadata: {fields}
User information: {user}"#
    )
}

/// Ask the agent to label each button `submit` or `additional_action`.
pub fn button_classification_prompt(buttons: &[WebElement]) -> String {
    let buttons = serde_json::to_string(buttons).unwrap_or_else(|_| "[]".to_string());
    let keywords = SUBMIT_KEYWORDS.join(", ");
    format!(
        r#"You are a JSON processor. You receive an array of button objects from a web form.
Return the full array, modified as follows. For EACH object:
1. Keep ALL original key-value pairs (tag, id, disabled).
2. Add ONE new key named "purpose".
   Use "submit" if the "id" contains any of these keywords (case-insensitive): {keywords}.
   Otherwise use "additional_action".

Critical rule: there MUST be exactly ONE object with purpose "submit" in the whole array.
Every other object must be "additional_action".

Return ONLY the JSON array of objects, in the same structure as the input.
Buttons: {buttons}"#
    )
}
