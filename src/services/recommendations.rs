use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{display_value, Product, RecommendationRequest, RecommendationResponse},
    services::providers::ChatModel,
};

pub const MISSING_INPUT_MESSAGE: &str = "Missing preference or products";
pub const MISSING_API_KEY_MESSAGE: &str = "GEMINI_API_KEY is not set";

/// How model-chosen ids are filtered before they reach the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdPolicy {
    /// Return whatever the model produced
    #[default]
    PassThrough,
    /// Keep only ids that match a submitted product
    RestrictToSubmitted,
}

impl IdPolicy {
    pub fn from_flag(restrict: bool) -> Self {
        if restrict {
            IdPolicy::RestrictToSubmitted
        } else {
            IdPolicy::PassThrough
        }
    }
}

/// Asks the model which of the submitted products match the preference
///
/// Input is validated before the model is consulted, and the model is only
/// required once the input is known to be usable. An unreadable reply
/// degrades to an empty recommendation list rather than an error.
pub async fn get_recommendations(
    model: Option<&dyn ChatModel>,
    request: RecommendationRequest,
    policy: IdPolicy,
) -> AppResult<RecommendationResponse> {
    let (preference, products) = validate(request)?;
    let prompt = build_prompt(&preference, &products);

    let model = model.ok_or_else(|| AppError::Config(MISSING_API_KEY_MESSAGE.to_string()))?;

    tracing::info!(
        provider = model.name(),
        product_count = products.len(),
        "Requesting recommendations from model"
    );

    let reply = model.invoke(&prompt).await?;
    let text = reply.primary_text();

    let mut ids = parse_recommended_ids(&text);
    if policy == IdPolicy::RestrictToSubmitted {
        ids = restrict_to_submitted(ids, &products);
    }

    tracing::info!(recommended_count = ids.len(), "Recommendations ready");

    Ok(RecommendationResponse {
        recommended_ids: ids,
    })
}

fn validate(request: RecommendationRequest) -> AppResult<(String, Vec<Product>)> {
    match (request.preference, request.products) {
        (Some(preference), Some(products)) if !preference.is_empty() && !products.is_empty() => {
            Ok((preference, products))
        }
        _ => Err(AppError::InvalidInput(MISSING_INPUT_MESSAGE.to_string())),
    }
}

/// Renders the instruction prompt for a preference and its candidate products
pub fn build_prompt(preference: &str, products: &[Product]) -> String {
    let catalog = products
        .iter()
        .map(Product::catalog_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an AI product recommendation system.

User preference:
"""{preference}"""

Here is the list of available products:
{catalog}

From ONLY the above products, choose the best matches.

Rules:
- Only choose products from the list.
- Output ONLY a JSON array of product IDs. Example:
[1, 3, 5]
Do not add any explanation text. Only output valid JSON.
"#
    )
}

/// Parses the model's text as a JSON array of ids
///
/// Anything that is not a JSON array yields an empty list.
pub fn parse_recommended_ids(text: &str) -> Vec<Value> {
    let payload = strip_code_fence(text.trim());

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(ids)) => ids,
        Ok(other) => {
            tracing::warn!(
                response = %text,
                kind = json_kind(&other),
                "Model response is JSON but not an array"
            );
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(response = %text, error = %e, "Failed to parse model response");
            Vec::new()
        }
    }
}

/// Removes a surrounding Markdown code fence, with or without a language tag
fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = body.strip_suffix("```") else {
        return text;
    };

    // Drop the info string ("json") on the opening line.
    match body.split_once('\n') {
        Some((info, rest)) if !info.trim().contains(['[', '{']) => rest.trim(),
        _ => body.trim(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn restrict_to_submitted(ids: Vec<Value>, products: &[Product]) -> Vec<Value> {
    let (kept, dropped): (Vec<Value>, Vec<Value>) = ids.into_iter().partition(|id| {
        products.iter().filter_map(|p| p.id.as_ref()).any(|submitted| {
            submitted == id || display_value(submitted) == display_value(id)
        })
    });

    if !dropped.is_empty() {
        tracing::warn!(
            dropped = ?dropped,
            "Discarded ids that were not among the submitted products"
        );
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentBlock, ModelReply};
    use crate::services::providers::MockChatModel;
    use serde_json::json;

    fn sample_products() -> Vec<Product> {
        serde_json::from_value(json!([
            { "id": 1, "name": "iPhone 14", "category": "phone", "price": 799, "rating": 4.7 },
            { "id": 5, "name": "MacBook Air M2", "category": "laptop", "price": 1199, "rating": 4.8 },
            { "id": 7, "name": "Sony WH-1000XM5", "category": "headphone", "price": 399, "rating": 4.9 }
        ]))
        .unwrap()
    }

    fn sample_request() -> RecommendationRequest {
        RecommendationRequest {
            preference: Some("cheap noise cancelling headphones".to_string()),
            products: Some(sample_products()),
        }
    }

    fn model_replying(reply: ModelReply) -> MockChatModel {
        let mut model = MockChatModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_invoke()
            .times(1)
            .returning(move |_| Ok(reply.clone()));
        model
    }

    #[test]
    fn test_prompt_lists_products_in_order() {
        let products = sample_products();
        let prompt = build_prompt("something for travel", &products);

        let lines: Vec<&str> = prompt
            .lines()
            .filter(|line| line.starts_with("- id:"))
            .collect();

        assert_eq!(
            lines,
            vec![
                "- id: 1, name: iPhone 14, category: phone, price: 799, rating: 4.7",
                "- id: 5, name: MacBook Air M2, category: laptop, price: 1199, rating: 4.8",
                "- id: 7, name: Sony WH-1000XM5, category: headphone, price: 399, rating: 4.9",
            ]
        );
        assert!(prompt.contains("\"\"\"something for travel\"\"\""));
        assert!(prompt.contains("Only choose products from the list."));
        assert!(prompt.contains("Output ONLY a JSON array of product IDs."));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let products = sample_products();
        assert_eq!(
            build_prompt("laptop", &products),
            build_prompt("laptop", &products)
        );
    }

    #[test]
    fn test_parse_plain_array() {
        assert_eq!(parse_recommended_ids("[1,3]"), vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_parse_keeps_ids_unvalidated() {
        assert_eq!(
            parse_recommended_ids("  [\"sku-1\", 42, null]\n"),
            vec![json!("sku-1"), json!(42), Value::Null]
        );
    }

    #[test]
    fn test_parse_prose_degrades_to_empty() {
        assert!(parse_recommended_ids("I think options 1 and 3").is_empty());
    }

    #[test]
    fn test_parse_non_array_json_degrades_to_empty() {
        assert!(parse_recommended_ids(r#"{"ids": [1]}"#).is_empty());
        assert!(parse_recommended_ids("7").is_empty());
    }

    #[test]
    fn test_parse_fenced_array() {
        assert_eq!(
            parse_recommended_ids("```json\n[2, 5]\n```"),
            vec![json!(2), json!(5)]
        );
        assert_eq!(parse_recommended_ids("```[8]```"), vec![json!(8)]);
    }

    #[tokio::test]
    async fn test_recommendations_from_text_reply() {
        let model = model_replying(ModelReply::text("[1, 7]"));

        let response = get_recommendations(Some(&model), sample_request(), IdPolicy::PassThrough)
            .await
            .unwrap();

        assert_eq!(response.recommended_ids, vec![json!(1), json!(7)]);
    }

    #[tokio::test]
    async fn test_recommendations_from_block_reply() {
        let model = model_replying(ModelReply::blocks(vec![ContentBlock::text("[2]")]));

        let response = get_recommendations(Some(&model), sample_request(), IdPolicy::PassThrough)
            .await
            .unwrap();

        assert_eq!(response.recommended_ids, vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_prompt_reaches_model() {
        let mut model = MockChatModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_invoke()
            .withf(|prompt| {
                prompt.contains("cheap noise cancelling headphones")
                    && prompt.contains("- id: 7, name: Sony WH-1000XM5")
            })
            .times(1)
            .returning(|_| Ok(ModelReply::text("[7]")));

        let response = get_recommendations(Some(&model), sample_request(), IdPolicy::PassThrough)
            .await
            .unwrap();

        assert_eq!(response.recommended_ids, vec![json!(7)]);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_not_an_error() {
        let model = model_replying(ModelReply::text("I think options 1 and 3"));

        let response = get_recommendations(Some(&model), sample_request(), IdPolicy::PassThrough)
            .await
            .unwrap();

        assert!(response.recommended_ids.is_empty());
    }

    #[tokio::test]
    async fn test_missing_preference_skips_model() {
        let mut model = MockChatModel::new();
        model.expect_invoke().never();

        let request = RecommendationRequest {
            preference: Some(String::new()),
            products: Some(sample_products()),
        };
        let result = get_recommendations(Some(&model), request, IdPolicy::PassThrough).await;

        match result {
            Err(AppError::InvalidInput(msg)) => assert_eq!(msg, MISSING_INPUT_MESSAGE),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_products_rejected() {
        let mut model = MockChatModel::new();
        model.expect_invoke().never();

        let request = RecommendationRequest {
            preference: Some("anything".to_string()),
            products: Some(vec![]),
        };
        let result = get_recommendations(Some(&model), request, IdPolicy::PassThrough).await;

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_bad_input_wins_over_missing_key() {
        let result = get_recommendations(
            None,
            RecommendationRequest::default(),
            IdPolicy::PassThrough,
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_missing_model_is_config_error() {
        let result = get_recommendations(None, sample_request(), IdPolicy::PassThrough).await;

        match result {
            Err(AppError::Config(msg)) => assert_eq!(msg, MISSING_API_KEY_MESSAGE),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let mut model = MockChatModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_invoke()
            .returning(|_| Err(AppError::ExternalApi("connection reset".to_string())));

        let result =
            get_recommendations(Some(&model), sample_request(), IdPolicy::PassThrough).await;

        assert!(matches!(result, Err(AppError::ExternalApi(_))));
    }

    #[tokio::test]
    async fn test_large_integer_ids_survive_prompt_and_reply() {
        let request: RecommendationRequest = serde_json::from_str(
            r#"{
                "preference": "bulk order",
                "products": [{ "id": 12345678901234567890123, "name": "Pallet", "price": 10 }]
            }"#,
        )
        .unwrap();

        let mut model = MockChatModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_invoke()
            .withf(|prompt| prompt.contains("- id: 12345678901234567890123, name: Pallet"))
            .times(1)
            .returning(|_| Ok(ModelReply::text("[12345678901234567890123]")));

        let response = get_recommendations(Some(&model), request, IdPolicy::RestrictToSubmitted)
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"recommendedIds":[12345678901234567890123]}"#
        );
    }

    #[tokio::test]
    async fn test_restriction_drops_unknown_ids() {
        let model = model_replying(ModelReply::text(r#"[7, 99, "1"]"#));

        let response = get_recommendations(
            Some(&model),
            sample_request(),
            IdPolicy::RestrictToSubmitted,
        )
        .await
        .unwrap();

        assert_eq!(response.recommended_ids, vec![json!(7), json!("1")]);
    }
}
