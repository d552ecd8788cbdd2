//! Reply analysis: LLM classification of a customer reply into an intent record.
//!
//! Flow:
//! 1. Recent interaction history for the customer is rendered as context
//! 2. The LLM is asked for a JSON intent object
//! 3. A valid object is returned as-is; anything else goes to the fallback parser
//!
//! Generation failures never propagate: they yield an error-marked default record.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::AnalysisError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::fallback::FallbackParser;
use crate::pipeline::types::IntentRecord;
use crate::store::{DEFAULT_CONTEXT_LEN, InteractionLog};

const ANALYSIS_TEMPERATURE: f32 = 0.2;
const ANALYSIS_MAX_TOKENS: u32 = 1024;

/// Classifies customer replies.
pub struct ReplyAnalyzer {
    llm: Arc<dyn LlmProvider>,
    log: Arc<InteractionLog>,
    fallback: FallbackParser,
}

impl ReplyAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>, log: Arc<InteractionLog>) -> Self {
        Self {
            llm,
            log,
            fallback: FallbackParser::new(),
        }
    }

    /// Classify `reply` from `customer_address`.
    ///
    /// `previous_context` is caller-supplied text placed in the prompt
    /// verbatim; pass `""` when there is none. Always returns a record.
    pub async fn analyze(
        &self,
        reply: &str,
        customer_address: &str,
        previous_context: &str,
    ) -> IntentRecord {
        let customer_context = self
            .log
            .render_context(customer_address, DEFAULT_CONTEXT_LEN)
            .await;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_analysis_system_prompt()),
            ChatMessage::user(build_analysis_user_prompt(
                reply,
                previous_context,
                &customer_context,
            )),
        ])
        .with_temperature(ANALYSIS_TEMPERATURE)
        .with_max_tokens(ANALYSIS_MAX_TOKENS);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    customer = %customer_address,
                    model = %self.llm.model_name(),
                    error = %e,
                    "Reply analysis failed"
                );
                return IntentRecord::failed(e.to_string());
            }
        };

        match parse_intent_response(&response.content) {
            Ok(intent) => {
                info!(
                    customer = %customer_address,
                    interest = %intent.interest_level,
                    sentiment = %intent.sentiment,
                    "Reply analyzed"
                );
                intent
            }
            Err(e) => {
                warn!(
                    customer = %customer_address,
                    error = %e,
                    "Analysis output not a valid intent object, using fallback parser"
                );
                debug!(raw_response = %response.content, "Unparsed analysis output");
                self.fallback.parse(&response.content)
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_analysis_system_prompt() -> String {
    "You analyze customer replies to sales outreach.\n\n\
     Determine:\n\
     1. Interest level: Interested, Not Interested, Unsure, or Needs More Information\n\
     2. Products mentioned or requested (be specific)\n\
     3. Any price sensitivity indicators: High, Low, or Unknown\n\
     4. Questions the customer has asked\n\
     5. Next best action to take (send information, offer discount, etc.)\n\
     6. Sentiment: Positive, Negative, or Neutral\n\n\
     Respond with ONLY a JSON object:\n\
     {\"interest_level\": \"...\", \"products_mentioned\": [\"...\"], \"price_sensitivity\": \"...\", \
     \"questions\": [\"...\"], \"next_action\": \"...\", \"sentiment\": \"...\"}"
        .to_string()
}

fn build_analysis_user_prompt(reply: &str, previous_context: &str, customer_context: &str) -> String {
    let mut prompt = String::with_capacity(reply.len() + customer_context.len() + 128);
    prompt.push_str(&format!("Analyze the following customer reply:\n\"{reply}\"\n"));

    if !previous_context.is_empty() {
        prompt.push('\n');
        prompt.push_str(previous_context);
        prompt.push('\n');
    }
    if !customer_context.is_empty() {
        prompt.push('\n');
        prompt.push_str(customer_context);
    }

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// A list field the model may also give as a single string or null.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum StringList {
    Many(Vec<String>),
    One(String),
    #[default]
    Missing,
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Many(items) => items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Self::One(item) if item.trim().is_empty() => Vec::new(),
            Self::One(item) => vec![item.trim().to_string()],
            Self::Missing => Vec::new(),
        }
    }
}

/// Raw intent object as generated.
#[derive(Debug, Deserialize)]
struct IntentResponse {
    interest_level: String,
    #[serde(default)]
    products_mentioned: StringList,
    price_sensitivity: String,
    #[serde(default)]
    questions: StringList,
    next_action: String,
    sentiment: String,
}

impl IntentResponse {
    /// Validate every enumerated field against its domain.
    fn into_record(self) -> Result<IntentRecord, AnalysisError> {
        Ok(IntentRecord {
            interest_level: self.interest_level.parse()?,
            products_mentioned: self.products_mentioned.into_vec(),
            price_sensitivity: self.price_sensitivity.parse()?,
            questions: self.questions.into_vec(),
            next_action: self.next_action.trim().to_string(),
            sentiment: self.sentiment.parse()?,
            error: None,
        })
    }
}

/// Parse generated text into a validated intent record.
pub fn parse_intent_response(raw: &str) -> Result<IntentRecord, AnalysisError> {
    let json = extract_json_object(raw).ok_or(AnalysisError::NoJson)?;
    let response: IntentResponse = serde_json::from_str(&json)?;
    response.into_record()
}

/// The span from the first `{` to the last `}`, with line breaks flattened.
pub fn extract_json_object(text: &str) -> Option<String> {
    let flat = text.replace(['\r', '\n'], " ");
    match (flat.find('{'), flat.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(flat[start..=end].to_string()),
        _ => None,
    }
}
