//! AI augmenter: asks a chat-completion endpoint to classify a bulletin and reports
//! its own confidence. The bulletin scraper decides whether to trust it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AiSettings;
use crate::error::IngestError;
use crate::ingest::http::{endpoint, send_checked, transport_error};
use crate::model::{clamp_confidence, SeverityLevel};

/// Input text is cut to this many characters before it is sent.
pub const MAX_INPUT_CHARS: usize = 3000;

const DEFAULT_LEVEL_LABEL: &str = "未知";
const DEFAULT_HAZARD: &str = "综合风险";

const SYSTEM_PROMPT: &str = "你是气象公告信息抽取器。请从输入文本中提取并返回 JSON：\
summary(<=60字), level(红色/橙色/黄色/蓝色/未知), hazard_type, confidence(0-1)。\
如果信息不足，给出保守结果。";

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Classification returned by the augmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationResult {
    pub summary: String,
    pub level: SeverityLevel,
    pub hazard_kind: String,
    /// Always within [0,1].
    pub confidence: f64,
}

pub type AugmentFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<AugmentationResult>, IngestError>> + Send + 'a>>;

/// Trait object used by the bulletin scraper (and stubbed in tests).
pub trait Augmenter: Send + Sync {
    /// `Ok(None)` means "no usable result"; errors are real failures.
    fn extract<'a>(&'a self, source_url: &'a str, title: &'a str, text: &'a str)
        -> AugmentFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynAugmenter = Arc<dyn Augmenter>;

/// Factory: the chat-completion client when settings make it usable, else a disabled one.
pub fn build_augmenter(settings: &AiSettings, http: reqwest::Client) -> DynAugmenter {
    if settings.is_active() {
        tracing::info!(
            provider = %settings.provider,
            model = %settings.model,
            key_len = settings.api_key.as_deref().map(str::len).unwrap_or(0),
            "AI augmentation enabled"
        );
        Arc::new(ChatCompletionAugmenter::new(settings.clone(), http))
    } else {
        Arc::new(DisabledAugmenter)
    }
}

// ------------------------------------------------------------
// Implementations
// ------------------------------------------------------------

/// Returns `Ok(None)` always; used when AI is disabled.
pub struct DisabledAugmenter;

impl Augmenter for DisabledAugmenter {
    fn extract<'a>(
        &'a self,
        _source_url: &'a str,
        _title: &'a str,
        _text: &'a str,
    ) -> AugmentFuture<'a> {
        Box::pin(async { Ok(None) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// OpenAI-compatible Chat Completions client. Bearer auth, JSON-object response format.
pub struct ChatCompletionAugmenter {
    http: reqwest::Client,
    settings: AiSettings,
}

impl ChatCompletionAugmenter {
    pub fn new(settings: AiSettings, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    async fn extract_impl(
        &self,
        source_url: &str,
        title: &str,
        text: &str,
    ) -> Result<Option<AugmentationResult>, IngestError> {
        if !self.settings.is_active() {
            return Ok(None);
        }
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Ok(None);
        };

        let url = endpoint(&self.settings.api_base, "chat/completions");
        let req = build_request_body(&self.settings.model, source_url, title, text);
        let resp = send_checked(
            &url,
            self.http.post(&url).bearer_auth(api_key).json(&req),
        )
        .await?;
        let raw = resp.text().await.map_err(|e| transport_error(&url, e))?;
        let body: Value =
            serde_json::from_str(&raw).map_err(|e| IngestError::malformed("AI response", e))?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or("{}");
        let parsed = parse_augmentation(content)?;
        tracing::debug!(
            source_url,
            usable = parsed.is_some(),
            confidence = parsed.as_ref().map(|r| r.confidence),
            "AI bulletin classification"
        );
        Ok(parsed)
    }
}

impl Augmenter for ChatCompletionAugmenter {
    fn extract<'a>(
        &'a self,
        source_url: &'a str,
        title: &'a str,
        text: &'a str,
    ) -> AugmentFuture<'a> {
        Box::pin(self.extract_impl(source_url, title, text))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Request / response helpers
// ------------------------------------------------------------

/// Chat-completion request: system prompt, clipped user message, JSON-object output.
pub fn build_request_body(model: &str, source_url: &str, title: &str, text: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": build_user_message(source_url, title, text) },
        ],
        "response_format": { "type": "json_object" },
        "temperature": 0.1,
    })
}

pub fn build_user_message(source_url: &str, title: &str, text: &str) -> String {
    let clipped: String = text.chars().take(MAX_INPUT_CHARS).collect();
    format!("source_url={source_url}\ntitle={title}\ntext={clipped}")
}

/// Parse the model's JSON content defensively.
///
/// * content must be a JSON object, otherwise it is a malformed-payload error
/// * confidence: numbers or numeric strings, anything else is 0.0; clamped to [0,1]
/// * level/hazard fall back to "未知"/"综合风险"
/// * an empty summary means no usable result
pub fn parse_augmentation(content: &str) -> Result<Option<AugmentationResult>, IngestError> {
    let parsed: Value = serde_json::from_str(content)
        .map_err(|e| IngestError::malformed("AI response content", e))?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| IngestError::malformed("AI response content", "expected a JSON object"))?;

    let summary = text_field(obj.get("summary")).trim().to_string();
    let level_label = non_blank(text_field(obj.get("level")), DEFAULT_LEVEL_LABEL);
    let hazard_kind = non_blank(text_field(obj.get("hazard_type")), DEFAULT_HAZARD);
    let confidence = clamp_confidence(confidence_field(obj.get("confidence")));

    if summary.is_empty() {
        return Ok(None);
    }

    Ok(Some(AugmentationResult {
        summary,
        level: SeverityLevel::from_label(&level_label),
        hazard_kind,
        confidence,
    }))
}

fn text_field(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn non_blank(s: String, default: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        default.to_string()
    } else {
        t.to_string()
    }
}

fn confidence_field(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
