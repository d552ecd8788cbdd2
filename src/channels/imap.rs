//! Mailbox retrieval, the seam between the poller and the wire.
//!
//! `MailboxClient` opens a session that is already logged in with INBOX
//! selected. `ImapMailbox` implements it with raw IMAP4rev1 over rustls
//! (blocking; run it under `spawn_blocking`).

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::channels::email::EmailConfig;
use crate::error::MailboxError;

/// Socket read timeout; a hung server surfaces as an IO error.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens mailbox sessions.
pub trait MailboxClient: Send + Sync {
    /// Connect, authenticate and select the inbox.
    fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// An open, authenticated mailbox with the inbox selected.
pub trait MailboxSession: Send {
    /// Identifiers of messages not yet marked as read.
    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError>;

    /// Full RFC 5322 bytes of one message. Marks it \Seen as a side effect.
    fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError>;

    /// Close the mailbox and log out.
    fn close(&mut self) -> Result<(), MailboxError>;
}

// ── IMAP over TLS ───────────────────────────────────────────────────

/// IMAP mailbox reached over implicit TLS (port 993).
pub struct ImapMailbox {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
}

impl ImapMailbox {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            host: config.imap_host.clone(),
            port: config.imap_port,
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

impl MailboxClient for ImapMailbox {
    fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            MailboxError::Connect {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| MailboxError::Tls(format!("invalid server name {}: {e}", self.host)))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut session = ImapSession {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            tag_counter: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&self.username),
            quote(self.password.expose_secret())
        );
        session
            .command(&login)
            .map_err(|e| MailboxError::Login(e.to_string()))?;
        session.command("SELECT INBOX")?;

        debug!(host = %self.host, "IMAP session open, INBOX selected");
        Ok(Box::new(session))
    }
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A tagged response: untagged lines plus any literals, in arrival order.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapSession {
    stream: BufReader<TlsStream>,
    tag_counter: u32,
}

impl ImapSession {
    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        if self.stream.read_until(b'\n', &mut buf)? == 0 {
            return Err(MailboxError::Closed);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Send one command and collect its response up to the tagged status.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        self.tag_counter += 1;
        let tag = format!("A{}", self.tag_counter);
        let verb = cmd.split_whitespace().next().unwrap_or_default().to_string();

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let mut response = Response::default();
        let tagged_prefix = format!("{tag} ");
        loop {
            let line = self.read_line()?;

            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
                response.lines.push(line);
                continue;
            }

            if let Some(status) = line.strip_prefix(&tagged_prefix) {
                return if status.starts_with("OK") {
                    Ok(response)
                } else {
                    Err(MailboxError::Command {
                        command: verb,
                        reason: status.trim_end().to_string(),
                    })
                };
            }

            response.lines.push(line);
        }
    }
}

impl MailboxSession for ImapSession {
    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.command("SEARCH UNSEEN")?;
        Ok(parse_search(&response.lines))
    }

    fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        let response = self.command(&format!("FETCH {id} RFC822"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Protocol(format!("FETCH {id} returned no message body")))
    }

    fn close(&mut self) -> Result<(), MailboxError> {
        if let Err(e) = self.command("CLOSE") {
            warn!(error = %e, "IMAP CLOSE failed");
        }
        self.command("LOGOUT").map(|_| ())
    }
}

/// Quote a string as an IMAP quoted-string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Byte count of a `{N}` literal announced at the end of a response line.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// Message numbers from `* SEARCH` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_len_detects_announcement() {
        assert_eq!(literal_len("* 1 FETCH (RFC822 {342}\r\n"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (RFC822 {0}\r\n"), Some(0));
    }

    #[test]
    fn literal_len_ignores_plain_lines() {
        assert_eq!(literal_len("* OK ready\r\n"), None);
        assert_eq!(literal_len("A1 OK {done\r\n"), None);
        assert_eq!(literal_len("* 1 FETCH {abc}\r\n"), None);
    }

    #[test]
    fn parse_search_collects_ids() {
        let lines = vec![
            "* SEARCH 3 7 12\r\n".to_string(),
            "* OK still here\r\n".to_string(),
        ];
        assert_eq!(parse_search(&lines), vec!["3", "7", "12"]);
    }

    #[test]
    fn parse_search_empty_result() {
        let lines = vec!["* SEARCH\r\n".to_string()];
        assert!(parse_search(&lines).is_empty());
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }
}
