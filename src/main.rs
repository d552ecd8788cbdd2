use std::sync::Arc;

use anyhow::Context as _;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use sales_assist::channels::{ImapMailbox, MailboxClient, MailboxPoller, SmtpMailTransport};
use sales_assist::config::AppConfig;
use sales_assist::llm::create_provider;
use sales_assist::pipeline::ReplyAnalyzer;
use sales_assist::store::InteractionLog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("loading configuration")?;

    // Console plus a daily-rolling file; the guard flushes on drop.
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "sales-assist.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    let Some(email) = config.email.clone() else {
        anyhow::bail!("EMAIL_USERNAME not set; there is no mailbox to watch");
    };

    eprintln!("📬 Sales Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}@{}", email.username, email.imap_host);
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Interactions: {}", config.interactions_path.display());
    eprintln!("   Press Ctrl-C to stop.\n");

    let log = Arc::new(InteractionLog::open(&config.interactions_path).await);
    let llm = create_provider(&config.llm)?;
    let analyzer = ReplyAnalyzer::new(llm, Arc::clone(&log));

    // SMTP is only checked here; sends go through `EmailSender` callers.
    let smtp = SmtpMailTransport::new(&email)?;
    match tokio::task::spawn_blocking(move || smtp.verify()).await {
        Ok(Ok(())) => info!(host = %email.smtp_host, "SMTP connection verified"),
        Ok(Err(e)) => warn!(host = %email.smtp_host, error = %e, "SMTP verification failed"),
        Err(e) => warn!(error = %e, "SMTP verification task failed"),
    }

    let mailbox: Arc<dyn MailboxClient> = Arc::new(ImapMailbox::new(&email));
    let poller = MailboxPoller::new(mailbox)
        .with_interval(email.poll_interval)
        .with_stop_grace(email.stop_grace)
        .with_interaction_log(Arc::clone(&log));
    poller.start();

    let mut ticker = tokio::time::interval(config.drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => process_replies(&poller, &analyzer).await,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutdown requested");
                break;
            }
        }
    }

    poller.stop().await;
    process_replies(&poller, &analyzer).await;
    info!("Sales Assist stopped");
    Ok(())
}

/// Drain queued replies and log each one's intent as JSON.
async fn process_replies(poller: &MailboxPoller, analyzer: &ReplyAnalyzer) {
    let items = poller.drain();
    if items.is_empty() {
        return;
    }
    info!(count = items.len(), "Analyzing customer replies");

    for item in items {
        let intent = analyzer.analyze(&item.body, &item.from_address, "").await;
        match serde_json::to_string(&intent) {
            Ok(json) => info!(
                from = %item.from_address,
                subject = %item.subject,
                intent = %json,
                "Customer reply analyzed"
            ),
            Err(e) => error!(from = %item.from_address, error = %e, "Failed to serialize intent"),
        }
    }
}
