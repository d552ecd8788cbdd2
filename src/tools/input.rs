//! Parsing for `|||`-delimited tool inputs.
//!
//! Agents pass a single string per tool call. Fields are split on
//! [`FIELD_DELIMITER`] and trimmed; trailing optional fields may be omitted.

use crate::channels::email::OutgoingEmail;
use crate::error::ToolInputError;

pub const FIELD_DELIMITER: &str = "|||";

pub const ANALYZE_INPUT_FORMAT: &str = "customer_email|||reply_text[|||previous_context]";
pub const SEND_INPUT_FORMAT: &str = "recipient|||subject|||body[|||cc]";

/// Arguments for one reply analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub customer_email: String,
    pub reply: String,
    /// Empty when not supplied.
    pub previous_context: String,
}

fn split_fields(input: &str) -> Vec<&str> {
    input.split(FIELD_DELIMITER).map(str::trim).collect()
}

/// Parse `customer_email|||reply_text[|||previous_context]`.
pub fn parse_analyze_input(input: &str) -> Result<AnalyzeRequest, ToolInputError> {
    match split_fields(input).as_slice() {
        [email, reply, rest @ ..] => Ok(AnalyzeRequest {
            customer_email: email.to_string(),
            reply: reply.to_string(),
            previous_context: rest.first().map(|c| c.to_string()).unwrap_or_default(),
        }),
        _ => Err(ToolInputError::Format {
            expected: ANALYZE_INPUT_FORMAT,
        }),
    }
}

/// Parse `recipient|||subject|||body[|||cc,cc,...]`.
///
/// Address validity is checked at send time, not here.
pub fn parse_send_input(input: &str) -> Result<OutgoingEmail, ToolInputError> {
    match split_fields(input).as_slice() {
        [to, subject, body, rest @ ..] => {
            let cc = rest
                .first()
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Ok(OutgoingEmail::new(*to, *subject, *body).with_cc(cc))
        }
        _ => Err(ToolInputError::Format {
            expected: SEND_INPUT_FORMAT,
        }),
    }
}
