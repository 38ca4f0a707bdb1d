use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_router::api::{ApiState, api_routes};
use inbox_router::channels::email::ensure_crypto_provider;
use inbox_router::channels::{ImapMailbox, SmtpMailer};
use inbox_router::config::AppConfig;
use inbox_router::models::{create_classifier, create_generator};
use inbox_router::pipeline::{
    ClassifierAdapter, InboxProcessor, InboxService, ReplyGenerator, spawn_inbox_poller,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    ensure_crypto_provider();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive for the whole process so the file writer flushes.
    let _log_guard = init_tracing(&config);

    eprintln!("📬 Inbox Router v{}", env!("CARGO_PKG_VERSION"));

    // ── Models ──────────────────────────────────────────────────────────
    let classifier = ClassifierAdapter::from_model(create_classifier(&config.models)?);
    let generator = ReplyGenerator::from_model(create_generator(&config.models)?);
    eprintln!(
        "   Classifier: {}",
        config.models.classifier_url.as_deref().unwrap_or("(not loaded)")
    );
    eprintln!(
        "   Generator: {}",
        config.models.generator_url.as_deref().unwrap_or("(fallback replies only)")
    );

    // ── Inbox ───────────────────────────────────────────────────────────
    let mut poller = None;
    let inbox = match config.email.clone() {
        Some(email_config) => {
            let sender = SmtpMailer::new(&email_config).context("Failed to build SMTP transport")?;
            let poll_interval = email_config.poll_interval_secs;
            eprintln!(
                "   Inbox: {}@{}:{} (marker {:?})",
                email_config.username,
                email_config.imap_host,
                email_config.imap_port,
                config.cycle.subject_marker
            );

            let processor = InboxProcessor::new(
                Arc::new(ImapMailbox::new(email_config)),
                Arc::new(sender),
                classifier.clone(),
                generator.clone(),
            );
            let service = Arc::new(InboxService::new(processor, config.cycle.clone()));

            if poll_interval > 0 {
                eprintln!("   Poller: every {poll_interval}s");
                poller = Some(spawn_inbox_poller(
                    Arc::clone(&service),
                    Duration::from_secs(poll_interval),
                ));
            } else {
                eprintln!("   Poller: disabled (use POST /api/inbox/check)");
            }
            Some(service)
        }
        None => {
            eprintln!("   Inbox: not configured (set EMAIL_IMAP_HOST to enable)");
            None
        }
    };

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        classifier,
        generator,
        inbox: inbox.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    eprintln!("   HTTP: http://0.0.0.0:{}/process_email/\n", config.http_port);
    tracing::info!(port = config.http_port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    if let Some((handle, shutdown)) = poller {
        shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        // Stops the timer only; a cycle already started runs on its own task.
        handle.abort();
        let _ = handle.await;
    }
    if let Some(service) = inbox {
        tracing::debug!("Waiting for any running inbox cycle to finish");
        service.wait_idle().await;
    }
    tracing::info!("Inbox router stopped");
    Ok(())
}

/// Console output always; a daily-rolling file when `ROUTER_LOG_DIR` is set.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false);

    match config.log_dir.as_ref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-router.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}
