//! Persistence layer: the customer interaction log.

pub mod interactions;

pub use interactions::{DEFAULT_CONTEXT_LEN, Direction, InteractionLog, InteractionRecord};
