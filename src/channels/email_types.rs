//! Email-specific types — `InboxItem` and header extraction.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::email_body::{clean_reply, extract_body};

/// A cleaned inbound message, ready for analysis.
///
/// Produced by the mailbox poller and consumed once by whoever drains the
/// queue. Delivery is at-least-once: the same `message_id` may appear in
/// more than one drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxItem {
    /// Bare sender address (`alice@example.com`).
    pub from_address: String,
    /// Decoded subject line (empty when absent).
    pub subject: String,
    /// Quote-stripped, whitespace-normalized body.
    pub body: String,
    /// When the poller ingested the message.
    pub timestamp: DateTime<Utc>,
    /// Mailbox-assigned identifier the message was fetched by.
    pub message_id: String,
    /// RFC 5322 `Message-ID` header, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_message_id: Option<String>,
}

impl InboxItem {
    /// Build an item from raw RFC 5322 bytes.
    ///
    /// Unparseable input still yields an item (sender `unknown`, empty
    /// subject and body) so nothing fetched is silently dropped.
    pub fn from_raw(message_id: impl Into<String>, raw: &[u8], received_at: DateTime<Utc>) -> Self {
        let message_id = message_id.into();

        let Some(parsed) = MessageParser::default().parse(raw) else {
            warn!(message_id = %message_id, "Unparseable message, enqueuing empty item");
            return Self {
                from_address: "unknown".into(),
                subject: String::new(),
                body: String::new(),
                timestamp: received_at,
                message_id,
                header_message_id: None,
            };
        };

        Self {
            from_address: extract_sender(&parsed),
            subject: parsed.subject().unwrap_or_default().to_string(),
            body: clean_reply(&extract_body(&parsed)),
            timestamp: received_at,
            message_id,
            header_message_id: parsed.message_id().map(str::to_string),
        }
    }
}

/// Extract the sender address from a parsed email.
///
/// Falls back to the raw `From` header text, then to `unknown`.
pub fn extract_sender(parsed: &mail_parser::Message<'_>) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .or_else(|| {
            parsed
                .header_raw("From")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_extracts_fields() {
        let raw = b"From: \"Jane Buyer\" <jane@customer.com>\r\n\
Subject: Re: Smart Watch offer\r\n\
Message-ID: <abc123@customer.com>\r\n\r\n\
Sounds great, send details.\r\n\r\nOn Mon, Jan 1 Sales wrote:\r\n> Our offer\r\n";
        let now = Utc::now();
        let item = InboxItem::from_raw("42", raw, now);

        assert_eq!(item.from_address, "jane@customer.com");
        assert_eq!(item.subject, "Re: Smart Watch offer");
        assert_eq!(item.body, "Sounds great, send details.");
        assert_eq!(item.message_id, "42");
        assert_eq!(item.header_message_id.as_deref(), Some("abc123@customer.com"));
        assert_eq!(item.timestamp, now);
    }

    #[test]
    fn from_raw_decodes_encoded_subject() {
        let raw = b"From: a@x.com\r\nSubject: =?UTF-8?B?Q2Fmw6k=?=\r\n\r\nhi\r\n";
        let item = InboxItem::from_raw("1", raw, Utc::now());
        assert_eq!(item.subject, "Café");
    }

    #[test]
    fn from_raw_missing_headers() {
        let raw = b"Subject: no sender\r\n\r\nbody\r\n";
        let item = InboxItem::from_raw("7", raw, Utc::now());
        assert_eq!(item.from_address, "unknown");
        assert_eq!(item.body, "body");
        assert!(item.header_message_id.is_none());
    }

    #[test]
    fn inbox_item_serde_roundtrip() {
        let item = InboxItem {
            from_address: "bob@example.com".into(),
            subject: "Re: Offer".into(),
            body: "Interested".into(),
            timestamp: Utc::now(),
            message_id: "3".into(),
            header_message_id: None,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("header_message_id"));
        let parsed: InboxItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
