use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod reply;

pub use reply::{ContentBlock, ModelReply, ReplyContent};

/// Placeholder rendered for product fields the caller left out
const MISSING_FIELD: &str = "n/a";

/// A candidate product supplied by the caller
///
/// Every field is an opaque display value. Nothing here is validated or parsed
/// numerically; `id` is echoed back exactly as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Product {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub rating: Option<Value>,
}

impl Product {
    /// Renders the product as a single catalog line for the prompt
    pub fn catalog_line(&self) -> String {
        format!(
            "- id: {}, name: {}, category: {}, price: {}, rating: {}",
            display_field(&self.id),
            display_field(&self.name),
            display_field(&self.category),
            display_field(&self.price),
            display_field(&self.rating),
        )
    }
}

/// Renders an opaque JSON value the way a person would read it
///
/// Strings lose their quotes, numbers keep their JSON form and anything else
/// falls back to compact JSON. Only absent fields render as `n/a`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_field(field: &Option<Value>) -> String {
    field
        .as_ref()
        .map(display_value)
        .unwrap_or_else(|| MISSING_FIELD.to_string())
}

/// Body of `POST /api/recommend`
///
/// Both fields are optional at the wire level so that a missing field is
/// reported as a bad request instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub preference: Option<String>,
    #[serde(default)]
    pub products: Option<Vec<Product>>,
}

/// Ids chosen by the model, in the order the model returned them
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub recommended_ids: Vec<Value>,
}
