//! Reply analysis pipeline.
//!
//! Every drained customer reply flows through:
//! 1. `InteractionLog::render_context()` for recent history
//! 2. `ReplyAnalyzer::analyze()` for an LLM-produced intent object
//! 3. `FallbackParser::parse()` when the output is not a valid object

pub mod analyzer;
pub mod fallback;
pub mod types;

pub use analyzer::ReplyAnalyzer;
pub use fallback::FallbackParser;
pub use types::{IntentRecord, InterestLevel, PriceSensitivity, Sentiment};
