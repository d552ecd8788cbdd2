//! End-to-end: mailbox → poller → drain → analyze, with the send path
//! feeding conversation history.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sales_assist::channels::{
    EmailSender, InboxItem, MailTransport, MailboxClient, MailboxPoller, MailboxSession,
    OutgoingEmail,
};
use sales_assist::error::{LlmError, MailboxError, SendError};
use sales_assist::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use sales_assist::pipeline::{InterestLevel, PriceSensitivity, ReplyAnalyzer, Sentiment};
use sales_assist::store::{Direction, InteractionLog};
use sales_assist::tools::{parse_analyze_input, parse_send_input};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Inbox {
    unseen: Mutex<VecDeque<(String, Vec<u8>)>>,
}

impl Inbox {
    fn deliver(&self, id: &str, raw: &str) {
        self.unseen
            .lock()
            .unwrap()
            .push_back((id.to_string(), raw.as_bytes().to_vec()));
    }
}

struct FakeClient(Arc<Inbox>);

struct FakeSession(Arc<Inbox>);

impl MailboxClient for FakeClient {
    fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError> {
        Ok(Box::new(FakeSession(Arc::clone(&self.0))))
    }
}

impl MailboxSession for FakeSession {
    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        Ok(self
            .0
            .unseen
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        let mut unseen = self.0.unseen.lock().unwrap();
        let pos = unseen
            .iter()
            .position(|(mid, _)| mid == id)
            .ok_or(MailboxError::Closed)?;
        let (_, raw) = unseen.remove(pos).ok_or(MailboxError::Closed)?;
        Ok(raw)
    }

    fn close(&mut self) -> Result<(), MailboxError> {
        Ok(())
    }
}

/// Answers with JSON when the reply mentions "discount", prose otherwise.
struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.user_prompt();
        self.prompts.lock().unwrap().push(prompt.clone());
        let content = if prompt.contains("discount") {
            "```json\n{\"interest_level\": \"Interested\",\n\"products_mentioned\": [\"Smart Watch\"],\n\
             \"price_sensitivity\": \"High\", \"questions\": [\"Is there a discount?\"],\n\
             \"next_action\": \"Offer discount\", \"sentiment\": \"Positive\"}\n```"
        } else {
            "The customer is not interested and seems frustrated.\nNext action: Close the lead"
        };
        Ok(CompletionResponse {
            content: content.to_string(),
        })
    }
}

/// Records every message handed to it.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl MailTransport for RecordingTransport {
    fn send(&self, _from: &str, email: &OutgoingEmail) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

async fn drain_until(poller: &MailboxPoller, want: usize) -> Vec<InboxItem> {
    let mut items = Vec::new();
    for _ in 0..200 {
        items.extend(poller.drain());
        if items.len() >= want {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    items
}

const JANE_REPLY: &str = "From: \"Jane Doe\" <jane@customer.com>\r\n\
Subject: Re: Spring offer\r\n\
Message-ID: <r1@customer.com>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
I like the Smart Watch. Is there a discount?\r\n\
\r\n\
On Mon, Mar 2, 2026 at 9:00 AM Sales <sales@shop.com> wrote:\r\n\
> Our spring offer...\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>I like the Smart Watch. Is there a discount?</p>\r\n\
--b1--\r\n";

const BOB_REPLY: &str = "From: bob@customer.com\r\n\
Subject: Re: Spring offer\r\n\
\r\n\
No thanks, please remove me.\r\n";

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn polled_replies_are_cleaned_logged_and_analyzed() {
    let inbox = Arc::new(Inbox::default());
    inbox.deliver("1", JANE_REPLY);
    inbox.deliver("2", BOB_REPLY);

    let log = Arc::new(InteractionLog::in_memory());
    let poller = MailboxPoller::new(Arc::new(FakeClient(Arc::clone(&inbox))))
        .with_interval(Duration::from_millis(10))
        .with_stop_grace(Duration::from_secs(1))
        .with_interaction_log(Arc::clone(&log));

    poller.start();
    let items = drain_until(&poller, 2).await;
    poller.stop().await;
    assert!(!poller.is_running());

    assert_eq!(items.len(), 2);
    let jane = &items[0];
    assert_eq!(jane.from_address, "jane@customer.com");
    assert_eq!(jane.subject, "Re: Spring offer");
    assert_eq!(jane.body, "I like the Smart Watch. Is there a discount?");
    assert_eq!(jane.header_message_id.as_deref(), Some("r1@customer.com"));

    // Ingestion recorded an INCOMING interaction per sender.
    let history = log.recent("jane@customer.com", 5).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].direction, Direction::Incoming);
    assert_eq!(history[0].content, jane.body);

    let llm = Arc::new(ScriptedLlm {
        prompts: Mutex::new(Vec::new()),
    });
    let analyzer = ReplyAnalyzer::new(llm.clone(), Arc::clone(&log));

    let intent = analyzer.analyze(&jane.body, &jane.from_address, "").await;
    assert_eq!(intent.interest_level, InterestLevel::Interested);
    assert_eq!(intent.price_sensitivity, PriceSensitivity::High);
    assert_eq!(intent.products_mentioned, vec!["Smart Watch"]);
    assert_eq!(intent.next_action, "Offer discount");
    assert!(intent.error.is_none());

    let bob = &items[1];
    let intent = analyzer.analyze(&bob.body, &bob.from_address, "").await;
    assert_eq!(intent.interest_level, InterestLevel::NotInterested);
    assert_eq!(intent.sentiment, Sentiment::Negative);
    assert_eq!(intent.next_action, "Close the lead");

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("Customer: I like the Smart Watch."));
}

#[tokio::test]
async fn sent_offer_becomes_analysis_context() {
    let log = Arc::new(InteractionLog::in_memory());
    let transport = Arc::new(RecordingTransport::default());
    let sender = EmailSender::new("sales@shop.com", transport.clone(), Arc::clone(&log));

    let email = parse_send_input(
        "jane@customer.com|||Spring offer|||Smart Watch now 20% off|||manager@shop.com",
    )
    .unwrap();
    let recipient = sender.send(email).await.unwrap();
    assert_eq!(recipient, "jane@customer.com");
    assert_eq!(transport.sent.lock().unwrap()[0].cc, vec!["manager@shop.com"]);

    let llm = Arc::new(ScriptedLlm {
        prompts: Mutex::new(Vec::new()),
    });
    let analyzer = ReplyAnalyzer::new(llm.clone(), Arc::clone(&log));

    let request =
        parse_analyze_input("jane@customer.com|||Any discount for two?|||Campaign: spring").unwrap();
    let intent = analyzer
        .analyze(
            &request.reply,
            &request.customer_email,
            &request.previous_context,
        )
        .await;
    assert_eq!(intent.interest_level, InterestLevel::Interested);

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("Campaign: spring"));
    assert!(prompts[0].contains("Agent: Smart Watch now 20% off..."));
}

#[tokio::test]
async fn invalid_recipient_is_never_sent_or_logged() {
    let log = Arc::new(InteractionLog::in_memory());
    let transport = Arc::new(RecordingTransport::default());
    let sender = EmailSender::new("sales@shop.com", transport.clone(), Arc::clone(&log));

    let email = parse_send_input("not-an-address|||Hi|||Body").unwrap();
    assert!(matches!(
        sender.send(email).await,
        Err(SendError::InvalidAddress(_))
    ));
    assert!(transport.sent.lock().unwrap().is_empty());
    assert!(log.recent("not-an-address", 5).await.is_empty());
}
