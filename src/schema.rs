//! Translation of action input schemas into MCP tool input schemas
//!
//! Action schemas arrive from the catalog as open-ended JSON-Schema-like
//! structures. MCP requires every tool inputSchema to be an object schema at
//! the root, so translation always produces `{"type": "object", ...}`.
//!
//! Translation is lossy on purpose: only the vocabulary the catalog actually
//! uses (string/number/integer/boolean, enum, array, nested object) is
//! carried over. A property whose descriptor is malformed or uses anything
//! else degrades to an unconstrained `{}` rather than failing the whole
//! registration pass.

use rmcp::model::JsonObject;
use serde_json::{json, Value};

/// Build an MCP tool input schema from an action's declared input schema.
///
/// An absent schema, or one without `properties`, yields an object schema
/// with no properties, which accepts an empty argument map.
pub fn translate_input_schema(schema: Option<&Value>) -> JsonObject {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    if let Some(props) = schema.and_then(|s| s.get("properties")).and_then(Value::as_object) {
        for (name, descriptor) in props {
            properties.insert(name.clone(), Value::Object(translate_descriptor(descriptor)));
        }
        // Keep required entries only when they name a property we carried over
        if let Some(req) = schema.and_then(|s| s.get("required")).and_then(Value::as_array) {
            required = req
                .iter()
                .filter(|r| {
                    r.as_str()
                        .map(|name| properties.contains_key(name))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
        }
    }

    let mut out = JsonObject::new();
    out.insert("type".to_string(), json!("object"));
    out.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".to_string(), Value::Array(required));
    }
    out
}

/// Translate a single property descriptor, degrading to `{}` on anything
/// the supported vocabulary does not cover.
fn translate_descriptor(descriptor: &Value) -> JsonObject {
    try_translate(descriptor).unwrap_or_default()
}

fn try_translate(descriptor: &Value) -> Option<JsonObject> {
    let desc = descriptor.as_object()?;
    let mut out = JsonObject::new();

    if let Some(d) = desc.get("description").and_then(Value::as_str) {
        out.insert("description".to_string(), json!(d));
    }

    // Enum descriptors stand alone; a non-array enum is malformed
    if let Some(e) = desc.get("enum") {
        let values = e.as_array()?;
        out.insert("enum".to_string(), Value::Array(values.clone()));
        return Some(out);
    }

    let ty = desc.get("type")?.as_str()?;
    match ty {
        "string" | "number" | "integer" | "boolean" => {
            out.insert("type".to_string(), json!(ty));
        }
        "object" => {
            out.insert("type".to_string(), json!("object"));
            if let Some(props) = desc.get("properties").and_then(Value::as_object) {
                let mut nested = serde_json::Map::new();
                for (name, inner) in props {
                    nested.insert(name.clone(), Value::Object(translate_descriptor(inner)));
                }
                if let Some(req) = desc.get("required").and_then(Value::as_array) {
                    let kept: Vec<Value> = req
                        .iter()
                        .filter(|r| {
                            r.as_str().map(|name| nested.contains_key(name)).unwrap_or(false)
                        })
                        .cloned()
                        .collect();
                    if !kept.is_empty() {
                        out.insert("required".to_string(), Value::Array(kept));
                    }
                }
                out.insert("properties".to_string(), Value::Object(nested));
            }
        }
        "array" => {
            out.insert("type".to_string(), json!("array"));
            if let Some(items) = desc.get("items") {
                out.insert("items".to_string(), Value::Object(translate_descriptor(items)));
            }
        }
        _ => return None,
    }

    Some(out)
}
