//! Four-section article summaries from a generator, validated and normalized.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::fragment::extract_first_json_object;
use crate::generator::{GenerationOptions, TextGenerator};
use crate::text_utils::{strip_code_fences, truncate_chars};
use crate::{Config, CoreError, ExtractedDocument, StructuredSummary};

const FIELDS: [&str; 4] = ["problem", "methodology", "results", "conclusion"];
const EXCERPT_CHARS: usize = 1000;

/// How generator replies are validated. Picked once, when the summarizer is
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// The output shape is declared to the generator and the reply is parsed
    /// as-is.
    SchemaConstrained,
    /// Fences are stripped and a JSON object is recovered from the reply.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub document: ExtractedDocument,
    pub focus_query: Option<String>,
}

impl SummaryRequest {
    pub fn new(document: ExtractedDocument) -> Self {
        Self {
            document,
            focus_query: None,
        }
    }

    pub fn with_focus(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.focus_query = (!query.trim().is_empty()).then_some(query);
        self
    }
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    mode: ResponseMode,
    char_limit: usize,
    language: String,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        let mode = if config.schema_output && generator.supports_schema() {
            ResponseMode::SchemaConstrained
        } else {
            ResponseMode::BestEffort
        };
        tracing::debug!(generator = generator.name(), mode = ?mode, "summarizer ready");
        Self {
            generator,
            mode,
            char_limit: config.summary_char_limit,
            language: config.response_language.clone(),
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Summarize the document. A failed generator call is returned as-is, never
    /// retried.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<StructuredSummary, CoreError> {
        let prompt = self.build_prompt(request.document.text(), request.focus_query.as_deref());
        let mut options = GenerationOptions::default();
        if self.mode == ResponseMode::SchemaConstrained {
            options = options.with_schema(summary_schema());
        }

        let raw = self.generator.generate(&prompt, &options).await?;
        parse_summary(&raw, self.mode)
    }

    fn build_prompt(&self, text: &str, focus_query: Option<&str>) -> String {
        let mut prompt = format!(
            "You summarize academic articles. Produce a JSON object with exactly these \
             required keys: \"problem\", \"methodology\", \"results\", \"conclusion\". \
             Each key holds a detailed, complete and clear explanation of that aspect of \
             the article below.\n\n\
             Strict rules:\n\
             - Return ONLY a valid JSON object, with no text before or after it.\n\
             - Write in {} and stay objective.\n",
            self.language
        );
        if let Some(focus) = focus_query {
            prompt.push_str(&format!(
                "- Give particular attention to this question from the reader: \"{}\"\n",
                focus.trim()
            ));
        }
        prompt.push_str("\nArticle text:\n");
        prompt.push_str(truncate_chars(text, self.char_limit));
        prompt.push_str("\n\nYour JSON output:");
        prompt
    }
}

/// Schema for the four summary fields, in the generator's schema dialect.
pub fn summary_schema() -> Value {
    let properties: Map<String, Value> = FIELDS
        .iter()
        .map(|f| (f.to_string(), json!({"type": "STRING"})))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": FIELDS,
    })
}

/// Validate a raw generator reply into a [`StructuredSummary`].
///
/// In schema mode the reply is parsed directly; if that fails the same reply
/// goes through the best-effort path (no second generator call).
pub fn parse_summary(raw: &str, mode: ResponseMode) -> Result<StructuredSummary, CoreError> {
    if mode == ResponseMode::SchemaConstrained {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
            return Ok(normalize(&map));
        }
        tracing::warn!("schema-constrained reply did not parse, trying best-effort recovery");
    }
    parse_best_effort(raw).map(|map| normalize(&map))
}

fn parse_best_effort(raw: &str) -> Result<Map<String, Value>, CoreError> {
    let cleaned = strip_code_fences(raw);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(cleaned) {
        return Ok(map);
    }

    let Some(fragment) = extract_first_json_object(cleaned) else {
        return Err(invalid_output("no JSON object in generator reply", raw));
    };
    match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid_output("recovered fragment is not a JSON object", raw)),
        Err(e) => Err(invalid_output(
            &format!("recovered fragment is not valid JSON: {e}"),
            raw,
        )),
    }
}

fn invalid_output(message: &str, raw: &str) -> CoreError {
    CoreError::InvalidModelOutput {
        message: message.to_string(),
        excerpt: truncate_chars(raw, EXCERPT_CHARS).to_string(),
    }
}

fn normalize(map: &Map<String, Value>) -> StructuredSummary {
    StructuredSummary {
        problem: normalize_field(map.get("problem")),
        methodology: normalize_field(map.get("methodology")),
        results: normalize_field(map.get("results")),
        conclusion: normalize_field(map.get("conclusion")),
    }
}

fn normalize_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        // Objects and arrays keep their compact JSON text.
        Some(v) => v.to_string(),
    }
}
