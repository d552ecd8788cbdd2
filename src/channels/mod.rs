//! Email channel: inbound polling over IMAP, outbound sends over SMTP.

pub mod email;
pub mod email_body;
pub mod email_poller;
pub mod email_types;
pub mod imap;

pub use email::{EmailConfig, EmailSender, MailTransport, OutgoingEmail, SmtpMailTransport};
pub use email_body::{clean_reply, extract_body};
pub use email_poller::MailboxPoller;
pub use email_types::InboxItem;
pub use imap::{ImapMailbox, MailboxClient, MailboxSession};
