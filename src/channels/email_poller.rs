//! Background mailbox poller — fetches unseen mail into an in-memory queue.
//!
//! Each cycle: connect → search unseen → fetch each → extract + clean →
//! enqueue `InboxItem`. Failures are logged and the loop sleeps until the
//! next cycle; only `stop()` ends it. Fetching marks messages \Seen, but
//! nothing stops another client from racing us, so consumers must treat
//! delivery as at-least-once and dedup on `message_id` if they care.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email_types::InboxItem;
use crate::channels::imap::{MailboxClient, MailboxSession};
use crate::error::MailboxError;
use crate::store::{Direction, InteractionLog};

/// Default pause between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on how long `stop()` waits for the loop to exit.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

type InboxQueue = Arc<Mutex<VecDeque<InboxItem>>>;

struct RunningLoop {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Polls a mailbox on a background task and buffers what it finds.
pub struct MailboxPoller {
    mailbox: Arc<dyn MailboxClient>,
    interval: Duration,
    stop_grace: Duration,
    log: Option<Arc<InteractionLog>>,
    queue: InboxQueue,
    running: Mutex<Option<RunningLoop>>,
}

impl MailboxPoller {
    pub fn new(mailbox: Arc<dyn MailboxClient>) -> Self {
        Self {
            mailbox,
            interval: DEFAULT_POLL_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
            log: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            running: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Record every ingested message as an `INCOMING` interaction.
    pub fn with_interaction_log(mut self, log: Arc<InteractionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Launch the background loop. A second call while running is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = lock(&self.running);
        if running.is_some() {
            warn!("Mailbox poller already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.mailbox),
            Arc::clone(&self.queue),
            self.log.clone(),
            self.interval,
            stop_rx,
        ));

        *running = Some(RunningLoop { handle, stop_tx });
        info!(interval_secs = self.interval.as_secs_f32(), "Mailbox poller started");
    }

    /// Signal the loop to stop and wait up to the grace period for it.
    ///
    /// Idempotent. A loop stuck in a mailbox call past the grace period is
    /// detached; it exits on its own once the call returns.
    pub async fn stop(&self) {
        let Some(RunningLoop { handle, stop_tx }) = lock(&self.running).take() else {
            debug!("Mailbox poller not running");
            return;
        };

        let _ = stop_tx.send(true);
        match tokio::time::timeout(self.stop_grace, handle).await {
            Ok(Ok(())) => info!("Mailbox poller stopped"),
            Ok(Err(e)) => error!(error = %e, "Mailbox poller task failed"),
            Err(_) => warn!(
                grace_secs = self.stop_grace.as_secs_f32(),
                "Mailbox poller did not stop within grace period, detaching"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Remove and return everything queued, oldest first. Never blocks on I/O.
    pub fn drain(&self) -> Vec<InboxItem> {
        lock(&self.queue).drain(..).collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_loop(
    mailbox: Arc<dyn MailboxClient>,
    queue: InboxQueue,
    log: Option<Arc<InteractionLog>>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        poll_once(&mailbox, &queue, log.as_deref()).await;

        let stopped = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            // Err means the poller itself was dropped.
            changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
        };
        if stopped {
            break;
        }
    }
    debug!("Mailbox poll loop exited");
}

/// A message as fetched from the mailbox, before parsing.
struct FetchedMessage {
    id: String,
    raw: Vec<u8>,
}

/// Run a single poll cycle: fetch unseen → parse + clean → enqueue.
async fn poll_once(
    mailbox: &Arc<dyn MailboxClient>,
    queue: &InboxQueue,
    log: Option<&InteractionLog>,
) {
    let mailbox = Arc::clone(mailbox);
    let fetch_result = tokio::task::spawn_blocking(move || {
        let mut fetched = Vec::new();
        let result = fetch_unseen(mailbox.as_ref(), &mut fetched);
        (fetched, result)
    })
    .await;

    let (fetched, result) = match fetch_result {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Mailbox poll task panicked");
            return;
        }
    };

    if !fetched.is_empty() {
        debug!(count = fetched.len(), "Fetched unseen emails");
    }

    // Messages fetched before a failure are already \Seen; keep them.
    for message in fetched {
        let item = InboxItem::from_raw(message.id, &message.raw, Utc::now());

        if let Some(log) = log {
            log.append(&item.from_address, Direction::Incoming, &item.subject, &item.body)
                .await;
        }

        info!(
            from = %item.from_address,
            message_id = %item.message_id,
            "New email added to queue"
        );
        lock(queue).push_back(item);
    }

    if let Err(e) = result {
        error!(error = %e, "Mailbox poll failed");
    }
}

/// Blocking: open a session, fetch every unseen message, close.
///
/// Successfully fetched messages are pushed to `fetched` even when a later
/// step fails.
fn fetch_unseen(
    mailbox: &dyn MailboxClient,
    fetched: &mut Vec<FetchedMessage>,
) -> Result<(), MailboxError> {
    let mut session = mailbox.connect()?;
    let result = fetch_all(session.as_mut(), fetched);
    if let Err(e) = session.close() {
        debug!(error = %e, "Mailbox close failed");
    }
    result
}

fn fetch_all(
    session: &mut dyn MailboxSession,
    fetched: &mut Vec<FetchedMessage>,
) -> Result<(), MailboxError> {
    for id in session.search_unseen()? {
        match session.fetch(&id) {
            Ok(raw) => fetched.push(FetchedMessage { id, raw }),
            // Server refused this one message; the session is still usable.
            Err(e @ MailboxError::Command { .. }) => {
                warn!(id = %id, error = %e, "Skipping message that failed to fetch");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
