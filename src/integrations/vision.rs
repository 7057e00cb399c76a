// src/integrations/vision.rs — OpenAI-compatible vision analyzer
//
// Every call is one chat completion in JSON mode. Photos travel inline as
// base64 data URLs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::infra::config::VisionConfig;
use crate::infra::errors::{BotError, Result};
use crate::integrations::types::{
    CategoryPrediction, EditIntent, FieldSpec, ImageAnalysis, TokenUsage, VisionAnalyzer,
};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

const ANALYZE_PROMPT: &str = "You write second-hand marketplace listings. Look at the photos of \
one item and answer with JSON {\"title\": string, \"description\": string}. The title is at most \
60 characters; the description is 2-4 plain sentences in the language of any visible text, \
without prices or contact details.";

const CATEGORY_PROMPT: &str = "Pick the category that fits the item best. Answer with JSON \
{\"category_id\": string or null}; use null when none of the candidates fits.";

const ATTRIBUTES_PROMPT: &str = "Fill the listing fields you can infer with confidence. Answer \
with JSON {\"attributes\": {field_id: value}}. For fields with options use an option id. Leave \
out fields you are unsure about.";

const EDIT_PROMPT: &str = "The user wants to change a listing. Answer with JSON \
{\"field\": \"title\"|\"description\"|\"price\"|null, \"value\": string}. Price values are plain \
numbers.";

pub struct OpenAIVisionAnalyzer {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAIVisionAnalyzer {
    pub fn new(api_key: String, config: &VisionConfig) -> Self {
        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Run one completion and decode its JSON content.
    async fn complete<T: DeserializeOwned>(
        &self,
        op: &'static str,
        system: &str,
        user_content: serde_json::Value,
    ) -> Result<(T, TokenUsage)> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user_content},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::analyzer(op, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BotError::analyzer(op, format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BotError::analyzer(op, format!("invalid response: {e}")))?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BotError::analyzer(op, "empty completion"))?;
        let usage = TokenUsage {
            input_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
        let parsed = parse_json_content(content)
            .ok_or_else(|| BotError::analyzer(op, format!("unparseable content: {content}")))?;
        Ok((parsed, usage))
    }
}

/// Decode model output, tolerating a surrounding ``` fence.
fn parse_json_content<T: DeserializeOwned>(content: &str) -> Option<T> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).ok()
}

fn data_url(image: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    format!("data:image/jpeg;base64,{encoded}")
}

#[derive(Deserialize)]
struct ListingText {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct CategoryPick {
    category_id: Option<String>,
}

#[derive(Deserialize)]
struct AttributePicks {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct EditWire {
    field: Option<String>,
    #[serde(default)]
    value: String,
}

impl From<EditWire> for EditIntent {
    fn from(w: EditWire) -> Self {
        let value = w.value.trim().to_string();
        match w.field.as_deref() {
            Some("title") if !value.is_empty() => EditIntent::Title(value),
            Some("description") if !value.is_empty() => EditIntent::Description(value),
            Some("price") => crate::flow::input::parse_price(&value)
                .map(EditIntent::Price)
                .unwrap_or(EditIntent::Unknown),
            _ => EditIntent::Unknown,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAIVisionAnalyzer {
    async fn analyze_images(&self, images: &[Vec<u8>]) -> Result<ImageAnalysis> {
        if images.is_empty() {
            return Err(BotError::analyzer("analyze_images", "no images"));
        }
        let content: Vec<serde_json::Value> = images
            .iter()
            .map(|img| serde_json::json!({"type": "image_url", "image_url": {"url": data_url(img)}}))
            .collect();
        let (text, usage): (ListingText, _) = self
            .complete("analyze_images", ANALYZE_PROMPT, serde_json::Value::from(content))
            .await?;
        if text.title.trim().is_empty() {
            return Err(BotError::analyzer("analyze_images", "empty title"));
        }
        Ok(ImageAnalysis {
            title: text.title.trim().to_string(),
            description: text.description.trim().to_string(),
            usage,
        })
    }

    async fn select_category(
        &self,
        title: &str,
        description: &str,
        candidates: &[CategoryPrediction],
    ) -> Result<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let listed: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}: {}", c.category_id, c.name))
            .collect();
        let prompt = format!(
            "Item: {title}\n{description}\n\nCandidates:\n{}",
            listed.join("\n")
        );
        let (pick, _): (CategoryPick, _) = self
            .complete("select_category", CATEGORY_PROMPT, serde_json::Value::from(prompt))
            .await?;
        // Only accept ids we offered.
        Ok(pick
            .category_id
            .filter(|id| candidates.iter().any(|c| &c.category_id == id)))
    }

    async fn select_attributes(
        &self,
        title: &str,
        description: &str,
        fields: &[FieldSpec],
    ) -> Result<BTreeMap<String, String>> {
        if fields.is_empty() {
            return Ok(BTreeMap::new());
        }
        let described: Vec<String> = fields
            .iter()
            .map(|f| {
                if f.options.is_empty() {
                    format!("{} ({}): free text", f.id, f.label)
                } else {
                    let opts: Vec<String> = f
                        .options
                        .iter()
                        .map(|o| format!("{}={}", o.id, o.label))
                        .collect();
                    format!("{} ({}): {}", f.id, f.label, opts.join(", "))
                }
            })
            .collect();
        let prompt = format!(
            "Item: {title}\n{description}\n\nFields:\n{}",
            described.join("\n")
        );
        let (picks, _): (AttributePicks, _) = self
            .complete("select_attributes", ATTRIBUTES_PROMPT, serde_json::Value::from(prompt))
            .await?;
        // Drop answers for unknown fields or invalid options.
        Ok(picks
            .attributes
            .into_iter()
            .filter_map(|(id, value)| {
                let field = fields.iter().find(|f| f.id == id)?;
                field.resolve(&value).map(|v| (id, v))
            })
            .collect())
    }

    async fn parse_edit_intent(&self, text: &str) -> Result<EditIntent> {
        let (wire, _): (EditWire, _) = self
            .complete("parse_edit_intent", EDIT_PROMPT, serde_json::Value::from(text))
            .await?;
        Ok(wire.into())
    }
}
