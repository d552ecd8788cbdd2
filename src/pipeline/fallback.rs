//! Pattern-based fallback parser for free-text analysis output.
//!
//! Used when the generated text does not contain a valid intent object.
//! Each axis is independent: the first matching rule wins, and an axis
//! whose patterns fail to compile keeps its default.

use regex::Regex;
use tracing::{debug, error};

use crate::pipeline::types::{IntentRecord, InterestLevel, PriceSensitivity, Sentiment};

const INTEREST_RULES: &[(&str, InterestLevel)] = &[
    (
        r"(?i)\binterested\b|showing interest|express(?:es|ed)? interest",
        InterestLevel::Interested,
    ),
    (
        r"(?i)not interested|\bdeclin|\breject|uninterested",
        InterestLevel::NotInterested,
    ),
    (r"(?i)\bunsure\b|\bunclear\b|ambiguous", InterestLevel::Unsure),
    (
        r"(?i)needs? more info|additional information|clarification",
        InterestLevel::NeedsMoreInformation,
    ),
];

const PRICE_RULES: &[(&str, PriceSensitivity)] = &[
    (
        r"(?i)price[ -]sensitive|concerns? about (?:the )?price|\bexpensive\b|\bcostly\b|\bcheaper\b",
        PriceSensitivity::High,
    ),
    (
        r"(?i)willing to pay|price is (?:fine|good|acceptable|ok)|not concerned about (?:the )?price",
        PriceSensitivity::Low,
    ),
];

const SENTIMENT_RULES: &[(&str, Sentiment)] = &[
    (
        r"(?i)positive sentiment|\bhappy\b|\bpleased\b|\bsatisfied\b",
        Sentiment::Positive,
    ),
    (
        r"(?i)negative sentiment|\bunhappy\b|\bdispleased\b|\bfrustrated\b",
        Sentiment::Negative,
    ),
    (
        r"(?i)neutral sentiment|neither positive nor negative",
        Sentiment::Neutral,
    ),
];

const PRODUCTS_LINE: &str = r"(?im)\bproducts?(?: mentioned)?:[ \t]*(.*)$";
const PRODUCT_SEPARATOR: &str = r"(?i),|\band\b";
const QUESTIONS_LINE: &str = r"(?im)\bquestions?:[ \t]*(.*)$";
const NEXT_ACTION_LINE: &str = r"(?im)\bnext (?:best )?action:[ \t]*(.*)$";

/// Negations that flip a bare "interested" match.
const NEGATIONS: &[&str] = &["not ", "no longer "];

/// An ordered rule list for one enumerated axis.
struct AxisRules<T> {
    rules: Vec<(Regex, T)>,
}

impl<T: Copy> AxisRules<T> {
    /// `None` if any pattern fails to compile, so the axis keeps its default.
    fn compile(axis: &str, table: &[(&str, T)]) -> Option<Self> {
        let rules = table
            .iter()
            .map(|(pattern, value)| Regex::new(pattern).map(|re| (re, *value)))
            .collect::<Result<Vec<_>, _>>();
        match rules {
            Ok(rules) => Some(Self { rules }),
            Err(e) => {
                error!(axis, error = %e, "Fallback pattern failed to compile");
                None
            }
        }
    }

    fn first_match(&self, accept: impl Fn(&Regex, T) -> bool) -> Option<T> {
        self.rules
            .iter()
            .find(|(re, value)| accept(re, *value))
            .map(|(_, value)| *value)
    }
}

fn compile_one(name: &str, pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .inspect_err(|e| error!(pattern = name, error = %e, "Fallback pattern failed to compile"))
        .ok()
}

/// True if some match of `re` in `text` is not directly preceded by a negation.
fn has_plain_match(re: &Regex, text: &str) -> bool {
    re.find_iter(text).any(|m| {
        let before = text[..m.start()].to_lowercase();
        !NEGATIONS.iter().any(|neg| before.ends_with(neg))
    })
}

/// Extracts an `IntentRecord` from free text with keyword patterns.
pub struct FallbackParser {
    interest: Option<AxisRules<InterestLevel>>,
    price: Option<AxisRules<PriceSensitivity>>,
    sentiment: Option<AxisRules<Sentiment>>,
    products: Option<Regex>,
    product_separator: Option<Regex>,
    questions: Option<Regex>,
    next_action: Option<Regex>,
}

impl Default for FallbackParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackParser {
    pub fn new() -> Self {
        Self {
            interest: AxisRules::compile("interest_level", INTEREST_RULES),
            price: AxisRules::compile("price_sensitivity", PRICE_RULES),
            sentiment: AxisRules::compile("sentiment", SENTIMENT_RULES),
            products: compile_one("products", PRODUCTS_LINE),
            product_separator: compile_one("product_separator", PRODUCT_SEPARATOR),
            questions: compile_one("questions", QUESTIONS_LINE),
            next_action: compile_one("next_action", NEXT_ACTION_LINE),
        }
    }

    /// Classify `text`. Never fails; unmatched axes keep their defaults.
    pub fn parse(&self, text: &str) -> IntentRecord {
        let mut record = IntentRecord::fallback_default();

        if let Some(level) = self.interest.as_ref().and_then(|rules| {
            rules.first_match(|re, level| match level {
                // A bare "interested" only counts when it is not negated.
                InterestLevel::Interested => has_plain_match(re, text),
                _ => re.is_match(text),
            })
        }) {
            record.interest_level = level;
        }

        if let Some(price) = self
            .price
            .as_ref()
            .and_then(|rules| rules.first_match(|re, _| re.is_match(text)))
        {
            record.price_sensitivity = price;
        }

        if let Some(sentiment) = self
            .sentiment
            .as_ref()
            .and_then(|rules| rules.first_match(|re, _| re.is_match(text)))
        {
            record.sentiment = sentiment;
        }

        if let Some(line) = self.products.as_ref().and_then(|re| first_capture(re, text)) {
            record.products_mentioned = match &self.product_separator {
                Some(sep) => sep
                    .split(&line)
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => vec![line],
            };
        }

        if let Some(re) = &self.questions {
            record.questions = re
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
        }

        if let Some(action) = self.next_action.as_ref().and_then(|re| first_capture(re, text)) {
            record.next_action = action;
        }

        debug!(
            interest = %record.interest_level,
            price = %record.price_sensitivity,
            sentiment = %record.sentiment,
            "Fallback parse complete"
        );
        record
    }
}

/// First non-empty capture group 1, trimmed.
fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
