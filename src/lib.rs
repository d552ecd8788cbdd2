//! Sales Assist: customer-reply ingestion and intent analysis.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod tools;
