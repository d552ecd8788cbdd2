//! Body extraction and quote stripping for inbound replies.
//!
//! Pure string/MIME handling with no I/O, no LLM calls. Neither function can
//! fail: decode problems degrade to partial or empty text.

use std::sync::LazyLock;

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};
use regex::Regex;
use tracing::{debug, error};

/// Patterns marking the start of quoted or forwarded content.
///
/// Every pattern is anchored on a preceding line break, so text on the
/// very first line is never treated as a boundary.
const QUOTE_BOUNDARY_PATTERNS: &[&str] = &[
    // "On Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:" (may wrap)
    r"(?s)\r?\nOn .*wrote:",
    // "> quoted line"
    r"\r?\n>",
    // "-----Original Message-----"
    r"\r?\n[^\n]*\bOriginal Message\b",
    // "--" signature / separator lines
    r"\r?\n-{2,}",
    // Outlook header block
    r"(?s)\r?\nFrom:.*Sent:.*To:.*Subject:",
];

static QUOTE_BOUNDARIES: LazyLock<Result<Vec<Regex>, regex::Error>> = LazyLock::new(|| {
    QUOTE_BOUNDARY_PATTERNS
        .iter()
        .map(|p| Regex::new(p))
        .collect()
});

/// Return the best plain-text representation of a parsed message.
///
/// Multipart: the first non-attachment `text/plain` part wins; failing
/// that, the first non-attachment `text/html` part (returned as-is).
/// Single-part: the decoded payload. Empty string when nothing decodes.
pub fn extract_body(message: &Message<'_>) -> String {
    let root = message.root_part();
    if !matches!(root.body, PartType::Multipart(_)) {
        return single_payload(root).unwrap_or_default();
    }

    let candidates = || message.parts.iter().filter(|part| !is_attachment(part));

    if let Some(text) = candidates().find_map(plain_text) {
        return text.to_string();
    }
    if let Some(html) = candidates().find_map(html_text) {
        return html.to_string();
    }

    debug!("Multipart message has no readable text part");
    String::new()
}

fn is_attachment(part: &MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
}

fn plain_text<'a>(part: &'a MessagePart<'_>) -> Option<&'a str> {
    let PartType::Text(text) = &part.body else {
        return None;
    };
    // Parts without a Content-Type default to text/plain.
    let is_plain = part.content_type().is_none_or(|ct| {
        ct.ctype().eq_ignore_ascii_case("text")
            && ct.subtype().is_none_or(|s| s.eq_ignore_ascii_case("plain"))
    });
    (is_plain && !text.is_empty()).then_some(&**text)
}

fn html_text<'a>(part: &'a MessagePart<'_>) -> Option<&'a str> {
    match &part.body {
        PartType::Html(html) if !html.is_empty() => Some(&**html),
        _ => None,
    }
}

fn single_payload(part: &MessagePart<'_>) -> Option<String> {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => Some(text.to_string()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        PartType::Message(_) | PartType::Multipart(_) => None,
    }
}

/// Strip quoted-thread content from a reply body and normalize whitespace.
///
/// Each boundary pattern is tried in order against the text left by the
/// previous ones; a match truncates at its start. Whitespace runs
/// (newlines included) collapse to one space. Idempotent.
pub fn clean_reply(body: &str) -> String {
    let boundaries = match QUOTE_BOUNDARIES.as_ref() {
        Ok(boundaries) => boundaries,
        Err(e) => {
            error!(error = %e, "Quote boundary patterns failed to compile");
            return body.trim().to_string();
        }
    };

    let mut fresh = body;
    for boundary in boundaries {
        if let Some(m) = boundary.find(fresh) {
            fresh = &fresh[..m.start()];
        }
    }

    fresh.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::MessageParser;

    fn parse(raw: &str) -> Message<'_> {
        MessageParser::default().parse(raw.as_bytes()).unwrap()
    }

    // ── extract_body ────────────────────────────────────────────

    #[test]
    fn extract_prefers_plain_over_html() {
        let raw = "From: a@x.com\r\n\
Content-Type: multipart/alternative; boundary=\"b\"\r\n\r\n\
--b\r\nContent-Type: text/html\r\n\r\n<p>html version</p>\r\n\
--b\r\nContent-Type: text/plain\r\n\r\nplain version\r\n\
--b--\r\n";
        assert_eq!(extract_body(&parse(raw)).trim(), "plain version");
    }

    #[test]
    fn extract_falls_back_to_html() {
        let raw = "From: a@x.com\r\n\
Content-Type: multipart/alternative; boundary=\"b\"\r\n\r\n\
--b\r\nContent-Type: text/html\r\n\r\n<p>only html</p>\r\n\
--b--\r\n";
        assert!(extract_body(&parse(raw)).contains("<p>only html</p>"));
    }

    #[test]
    fn extract_skips_text_attachments() {
        let raw = "From: a@x.com\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
--b\r\nContent-Type: text/plain\r\nContent-Disposition: attachment; filename=\"notes.txt\"\r\n\r\nattached notes\r\n\
--b\r\nContent-Type: text/html\r\n\r\n<p>body</p>\r\n\
--b--\r\n";
        let body = extract_body(&parse(raw));
        assert!(body.contains("<p>body</p>"));
        assert!(!body.contains("attached notes"));
    }

    #[test]
    fn extract_all_attachments_is_empty() {
        let raw = "From: a@x.com\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
--b\r\nContent-Type: text/plain\r\nContent-Disposition: attachment; filename=\"a.txt\"\r\n\r\nfirst\r\n\
--b\r\nContent-Type: text/html\r\nContent-Disposition: attachment; filename=\"b.html\"\r\n\r\n<p>second</p>\r\n\
--b--\r\n";
        assert_eq!(extract_body(&parse(raw)), "");
    }

    #[test]
    fn extract_single_part_plain() {
        let raw = "From: a@x.com\r\nSubject: hi\r\n\r\nJust text\r\n";
        assert_eq!(extract_body(&parse(raw)).trim(), "Just text");
    }

    #[test]
    fn extract_decodes_quoted_printable() {
        let raw = "From: a@x.com\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\n\
Caf=C3=A9 sounds good\r\n";
        assert_eq!(extract_body(&parse(raw)).trim(), "Café sounds good");
    }

    // ── clean_reply ─────────────────────────────────────────────

    #[test]
    fn clean_strips_on_wrote_attribution() {
        assert_eq!(
            clean_reply("Hello there\nOn Jan 1 wrote:\n> quoted"),
            "Hello there"
        );
    }

    #[test]
    fn clean_strips_wrapped_attribution() {
        let body = "Sounds good!\r\n\r\nOn Mon, Jan 1, 2026 at 10:00 AM Alice\r\n<alice@ex.com> wrote:\r\n> Original";
        assert_eq!(clean_reply(body), "Sounds good!");
    }

    #[test]
    fn clean_strips_quote_markers() {
        assert_eq!(clean_reply("Yes please\n> earlier text\n> more"), "Yes please");
    }

    #[test]
    fn clean_strips_original_message_line() {
        let body = "My reply\nThanks\n-----Original Message-----\nOld stuff";
        assert_eq!(clean_reply(body), "My reply Thanks");
    }

    #[test]
    fn clean_strips_dash_separator() {
        assert_eq!(clean_reply("Call me\n--\nBob\nSales"), "Call me");
    }

    #[test]
    fn clean_strips_outlook_header_block() {
        let body = "Works for me\nFrom: Sales\nSent: Monday\nTo: me\nSubject: Offer\nold body";
        assert_eq!(clean_reply(body), "Works for me");
    }

    #[test]
    fn clean_first_line_is_never_a_boundary() {
        assert_eq!(clean_reply("> not really a quote"), "> not really a quote");
    }

    #[test]
    fn clean_collapses_whitespace() {
        assert_eq!(clean_reply("  a\t\tb \n\n c  "), "a b c");
    }

    #[test]
    fn clean_is_idempotent() {
        let inputs = [
            "Hello there\nOn Jan 1 wrote:\n> quoted",
            "  spaced \n\n out  ",
            "line one\r\nline two\r\n--\r\nsig",
            "",
            "> x\n> y",
        ];
        for input in inputs {
            let once = clean_reply(input);
            assert_eq!(clean_reply(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn clean_arbitrary_bytes_never_grows() {
        // Deterministic xorshift stream; lossy decoding stands in for raw bytes.
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..500 {
            let len = (state % 96) as usize;
            let mut bytes = Vec::with_capacity(len);
            for _ in 0..len {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                bytes.push(match state % 8 {
                    0 => b'\n',
                    1 => b'>',
                    2 => b'-',
                    3 => b' ',
                    _ => (state >> 8) as u8,
                });
            }
            let input = String::from_utf8_lossy(&bytes);
            let cleaned = clean_reply(&input);
            assert!(cleaned.len() <= input.len());
            assert_eq!(clean_reply(&cleaned), cleaned);
        }
    }
}
