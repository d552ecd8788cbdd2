//! Error types for Sales Assist.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox retrieval errors (connect, login, search, fetch).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IMAP login failed: {0}")]
    Login(String),

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("IMAP connection closed unexpectedly")]
    Closed,

    #[error("Malformed IMAP response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound send errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Send to {recipient} failed after {attempts} attempts: {reason}")]
    Exhausted {
        recipient: String,
        attempts: u32,
        reason: String,
    },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Interaction store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structured-output extraction errors. Never surfaced past the analyzer;
/// they select the fallback path.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No JSON object in generated text")]
    NoJson,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Value {value:?} is outside the domain of {field}")]
    OutOfDomain { field: &'static str, value: String },
}

/// Errors parsing `|||`-delimited tool input from the agent layer.
#[derive(Debug, thiserror::Error)]
pub enum ToolInputError {
    #[error("Invalid input format. Use: '{expected}'")]
    Format { expected: &'static str },
}
