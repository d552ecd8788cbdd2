//! Delimited string inputs for agent-facing tools.

pub mod input;

pub use input::{
    ANALYZE_INPUT_FORMAT, AnalyzeRequest, FIELD_DELIMITER, SEND_INPUT_FORMAT, parse_analyze_input,
    parse_send_input,
};
