//! Vision extraction: read a product label with a vision LLM.
//!
//! The model is asked for the label's raw text plus the structured fields as
//! one JSON object. Fields it leaves empty are filled by the OCR heuristics.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use labelscan_core::{ExtractionError, ExtractionResult, Extractor, FieldName};

use crate::heuristics;
use crate::text_clean::{clean_block, has_readable_text};

const LABEL_PROMPT: &str = r#"You are a product label analyzer. Read every piece of text on this product label photo.

Return ONLY a JSON object with exactly these keys:
{
  "raw_text": "all text you can read, line by line",
  "product_name": "descriptive product name, not just the brand, or null",
  "brand": "brand or manufacturer, or null",
  "expiry_date": "expiry / best before / use by date as printed, or null",
  "mfg_date": "manufacturing date as printed, or null",
  "ingredients": ["individual ingredient", "..."],
  "warnings": ["complete warning or caution phrase", "..."]
}

Rules:
- Only report information that is actually printed on the label.
- Use null (not "unknown" or "") for anything not clearly present.
- Split ingredients into individual items without bullets or dashes."#;

/// Deadline for one provider call when none is configured.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(45);

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Supported vision providers.
#[derive(Debug, Clone)]
pub enum VisionProvider {
    OpenAI { api_key: String, model: String, base_url: String },
    Gemini { api_key: String, model: String, base_url: String },
}

impl VisionProvider {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::OpenAI {
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::Gemini {
            api_key: api_key.into(),
            model: "gemini-2.5-flash".to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, new_model: impl Into<String>) -> Self {
        match &mut self {
            Self::OpenAI { model, .. } | Self::Gemini { model, .. } => *model = new_model.into(),
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            Self::OpenAI { base_url, .. } | Self::Gemini { base_url, .. } => {
                *base_url = url.into().trim_end_matches('/').to_string()
            }
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI { .. } => "openai",
            Self::Gemini { .. } => "gemini",
        }
    }
}

/// HTTP client for provider calls. Every request is cut off after `timeout`.
pub fn provider_client(timeout: Duration) -> Result<Client, ExtractionError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ExtractionError::Provider {
            provider: "http".into(),
            message: e.to_string(),
        })
}

/// Send an image plus prompt to a vision LLM and return its text reply.
pub async fn describe_image(
    client: &Client,
    provider: &VisionProvider,
    image_bytes: &[u8],
    mime_type: &str,
    prompt: &str,
) -> Result<String, ExtractionError> {
    let b64 = STANDARD.encode(image_bytes);
    let reply = match provider {
        VisionProvider::OpenAI { api_key, model, base_url } => {
            describe_via_openai(client, api_key, model, base_url, &b64, mime_type, prompt).await
        }
        VisionProvider::Gemini { api_key, model, base_url } => {
            describe_via_gemini(client, api_key, model, base_url, &b64, mime_type, prompt).await
        }
    };
    reply.map_err(|e| ExtractionError::Provider {
        provider: provider.name().to_string(),
        message: e.to_string(),
    })
}

async fn describe_via_openai(
    client: &Client,
    api_key: &str,
    model: &str,
    base_url: &str,
    b64: &str,
    mime_type: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    info!("[Vision] Reading label via OpenAI {}", model);
    let body = serde_json::json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url",
                  "image_url": { "url": format!("data:{};base64,{}", mime_type, b64) } }
            ]
        }],
        "max_tokens": 1024
    });
    let resp = client
        .post(format!("{base_url}/v1/chat/completions"))
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("OpenAI vision error: {}", resp.text().await.unwrap_or_default());
    }
    let json: serde_json::Value = resp.json().await?;
    Ok(json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string())
}

async fn describe_via_gemini(
    client: &Client,
    api_key: &str,
    model: &str,
    base_url: &str,
    b64: &str,
    mime_type: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    info!("[Vision] Reading label via Gemini {}", model);
    let url = format!("{base_url}/v1beta/models/{model}:generateContent");
    let body = serde_json::json!({
        "contents": [{ "parts": [
            { "text": prompt },
            { "inlineData": { "mimeType": mime_type, "data": b64 } }
        ]}]
    });
    let resp = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("Gemini vision error: {}", resp.text().await.unwrap_or_default());
    }
    let json: serde_json::Value = resp.json().await?;
    Ok(json["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .unwrap_or("")
        .to_string())
}

/// Shape of the JSON object the label prompt asks for. Models drift from
/// the schema, so every field tolerates the wrong JSON type.
#[derive(Debug, Default, Deserialize)]
struct LabelReply {
    #[serde(default, deserialize_with = "lenient_text")]
    raw_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    product_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    expiry_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    mfg_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    ingredients: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list")]
    warnings: Option<Vec<String>>,
}

/// A string, or a number rendered as one. Anything else is absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A list of strings, or one delimited string. Non-string items are skipped.
fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(heuristics::split_items(&text)),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.trim().to_string()),
                    _ => None,
                })
                .filter(|text| !text.is_empty())
                .collect(),
        ),
        _ => None,
    })
}

/// Cut the JSON object out of a model reply that may be wrapped in
/// Markdown code fences or surrounded by prose.
pub fn strip_code_fences(reply: &str) -> &str {
    let mut body = reply.trim();
    if let Some((_, rest)) = body.split_once("```json") {
        body = rest.split("```").next().unwrap_or(rest);
    } else if let Some((_, rest)) = body.split_once("```") {
        body = rest.split("```").next().unwrap_or(rest);
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body.trim(),
    }
}

/// Turn a model reply into an extraction result, filling gaps heuristically.
pub fn parse_label_reply(reply: &str) -> Result<ExtractionResult, ExtractionError> {
    let parsed: LabelReply = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let raw_text = clean_block(parsed.raw_text.as_deref().unwrap_or_default());
    if !has_readable_text(&raw_text) {
        return Err(ExtractionError::NoText);
    }

    let mut result = ExtractionResult::new(0, raw_text);
    let scalars = [
        (FieldName::ProductName, parsed.product_name),
        (FieldName::Brand, parsed.brand),
        (FieldName::ExpiryDate, parsed.expiry_date),
        (FieldName::MfgDate, parsed.mfg_date),
    ];
    for (field, value) in scalars {
        if let Some(value) = value {
            result = result.with_text(field, value);
        }
    }
    if let Some(items) = parsed.ingredients {
        result = result.with_list(FieldName::Ingredients, items);
    }
    if let Some(items) = parsed.warnings {
        result = result.with_list(FieldName::Warnings, items);
    }

    heuristics::fill_gaps(&mut result);
    let confidence = heuristics::score(&result);
    Ok(result.with_confidence(confidence))
}

/// Extraction adapter backed by a vision LLM.
pub struct VisionExtractor {
    client: Client,
    provider: VisionProvider,
}

impl VisionExtractor {
    pub fn new(provider: VisionProvider, timeout: Duration) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: provider_client(timeout)?,
            provider,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Extractor for VisionExtractor {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::InvalidImage("empty image".into()));
        }
        debug!(bytes = image.len(), mime = %mime_type, provider = self.name(), "Extracting label");
        let reply = describe_image(&self.client, &self.provider, image, mime_type, LABEL_PROMPT).await?;
        parse_label_reply(&reply).inspect_err(|e| {
            warn!(provider = self.name(), error = %e, "Label reply unusable");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("Here you go: {\"a\": 1} done"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_label_reply() {
        let reply = r#"```json
{
  "raw_text": "DOVE\nDeep Moisture Bar\nIngredients: Water, Glycerin\n\nEXP 12/2026",
  "product_name": "Deep Moisture Bar",
  "brand": "Dove",
  "expiry_date": null,
  "mfg_date": null,
  "ingredients": ["Water", "Glycerin"],
  "warnings": []
}
```"#;
        let result = parse_label_reply(reply).unwrap();
        assert_eq!(result.text(FieldName::ProductName), Some("Deep Moisture Bar"));
        assert_eq!(result.text(FieldName::Brand), Some("Dove"));
        // Filled from the raw text by the date heuristic.
        assert_eq!(result.text(FieldName::ExpiryDate), Some("12/2026"));
        assert_eq!(result.list(FieldName::Ingredients), ["Water", "Glycerin"]);
        assert!((result.confidence.unwrap() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_parse_reply_without_text() {
        let reply = r#"{"raw_text": "  ", "product_name": null}"#;
        assert_eq!(parse_label_reply(reply), Err(ExtractionError::NoText));
    }

    #[test]
    fn test_parse_reply_not_json() {
        assert!(matches!(
            parse_label_reply("I cannot read this label."),
            Err(ExtractionError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_reply_with_string_list() {
        let reply = r#"{
            "raw_text": "Dove Soap\nIngredients: Water, Glycerin",
            "product_name": "Dove Soap",
            "ingredients": "Water, Glycerin"
        }"#;
        let result = parse_label_reply(reply).unwrap();
        assert_eq!(result.text(FieldName::ProductName), Some("Dove Soap"));
        assert_eq!(result.list(FieldName::Ingredients), ["Water", "Glycerin"]);
    }

    #[test]
    fn test_parse_reply_skips_null_items() {
        let reply = r#"{
            "raw_text": "Dove Soap\nKeep away from children",
            "product_name": "Dove Soap",
            "ingredients": ["Water", null, 3],
            "warnings": null,
            "expiry_date": {"printed": "12/2026"}
        }"#;
        let result = parse_label_reply(reply).unwrap();
        assert_eq!(result.list(FieldName::Ingredients), ["Water"]);
        // Unusable values are treated as missing and filled from the raw text.
        assert_eq!(result.list(FieldName::Warnings), ["Keep away from children"]);
        assert_eq!(result.text(FieldName::ExpiryDate), None);
    }

    #[test]
    fn test_parse_reply_numeric_scalar() {
        let reply = r#"{"raw_text": "ACME 2026 edition", "product_name": "Acme Balm", "mfg_date": 2024}"#;
        let result = parse_label_reply(reply).unwrap();
        assert_eq!(result.text(FieldName::MfgDate), Some("2024"));
    }

    #[tokio::test]
    async fn test_extractor_uses_bounded_client() {
        let extractor =
            VisionExtractor::new(VisionProvider::openai("sk-test"), Duration::from_secs(5)).unwrap();
        assert_eq!(extractor.name(), "openai");
        let err = extractor.extract(&[], "image/jpeg").await.unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidImage(_)));
    }

    #[test]
    fn test_provider_builders() {
        let provider = VisionProvider::gemini("key")
            .with_model("gemini-2.0-flash")
            .with_base_url("http://localhost:9000/");
        match provider {
            VisionProvider::Gemini { model, base_url, .. } => {
                assert_eq!(model, "gemini-2.0-flash");
                assert_eq!(base_url, "http://localhost:9000");
            }
            _ => panic!("expected gemini"),
        }
    }
}
