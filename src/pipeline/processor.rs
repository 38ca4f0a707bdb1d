//! Inbox processor: one poll cycle over the service mailbox.
//!
//! Flow per cycle:
//! 1. Connect (failure aborts the cycle before anything else happens)
//! 2. Snapshot unread ids
//! 3. Per id: fetch → filter on subject → classify → draft → reply → forward
//! 4. Disconnect, on every exit path
//!
//! Per-message failures land in that message's `ProcessingOutcome`; only
//! connection and listing failures end the cycle early.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::email_types::parse_inbound;
use crate::channels::{MailSender, Mailbox, MailboxSession};
use crate::config::CycleConfig;
use crate::error::{MailboxError, PerMessageError};
use crate::pipeline::classifier::ClassifierAdapter;
use crate::pipeline::generator::ReplyGenerator;
use crate::pipeline::types::{
    CycleReport, InboundMessage, MessageStage, OutgoingMail, ProcessingOutcome,
};

/// What happened to one listed id.
enum MessageStep {
    /// Subject lacked the marker. No side effects.
    Skipped,
    Handled(ProcessingOutcome),
}

/// Running totals for a cycle in progress.
#[derive(Default)]
struct Tally {
    listed: usize,
    skipped: usize,
    deferred: usize,
    outcomes: Vec<ProcessingOutcome>,
}

/// Runs poll cycles: classify, draft, reply and forward for each unread message.
pub struct InboxProcessor {
    mailbox: Arc<dyn Mailbox>,
    sender: Arc<dyn MailSender>,
    classifier: ClassifierAdapter,
    generator: ReplyGenerator,
}

impl InboxProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        sender: Arc<dyn MailSender>,
        classifier: ClassifierAdapter,
        generator: ReplyGenerator,
    ) -> Self {
        Self {
            mailbox,
            sender,
            classifier,
            generator,
        }
    }

    /// Run one cycle with a fixed configuration snapshot.
    ///
    /// Errors only when the mailbox cannot be connected to or listed; the
    /// session is disconnected in both cases once it was opened.
    pub async fn run_cycle(&self, config: &CycleConfig) -> Result<CycleReport, MailboxError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        // A budget too large to represent never expires.
        let deadline = Instant::now().checked_add(config.budget);

        info!(%run_id, server = self.mailbox.server(), "Inbox cycle starting");

        let mut session = self.mailbox.connect().await.map_err(|e| {
            error!(%run_id, error = %e, "Mailbox connection failed; cycle aborted");
            as_connection_error(self.mailbox.server(), e)
        })?;

        let result = self
            .process_session(session.as_mut(), config, deadline, run_id)
            .await;

        if let Err(e) = session.disconnect().await {
            warn!(%run_id, error = %e, "Mailbox disconnect failed");
        }

        let tally = result.inspect_err(|e| {
            error!(%run_id, error = %e, "Inbox cycle failed while listing");
        })?;

        let processed_count = tally.outcomes.iter().filter(|o| o.is_success()).count();
        let report = CycleReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            listed: tally.listed,
            skipped: tally.skipped,
            deferred: tally.deferred,
            processed_count,
            outcomes: tally.outcomes,
        };

        info!(
            %run_id,
            listed = report.listed,
            skipped = report.skipped,
            deferred = report.deferred,
            processed = report.processed_count,
            failed = report.failed_count(),
            "Inbox cycle complete"
        );
        Ok(report)
    }

    async fn process_session(
        &self,
        session: &mut dyn MailboxSession,
        config: &CycleConfig,
        deadline: Option<Instant>,
        run_id: Uuid,
    ) -> Result<Tally, MailboxError> {
        let ids = session.list_unread().await?;
        let mut tally = Tally {
            listed: ids.len(),
            ..Tally::default()
        };
        debug!(%run_id, count = ids.len(), "Listed unread messages");

        for (index, id) in ids.iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tally.deferred = ids.len() - index;
                warn!(%run_id, deferred = tally.deferred, "Cycle budget exhausted; deferring rest");
                break;
            }

            match self.process_message(session, config, id).await {
                MessageStep::Skipped => tally.skipped += 1,
                MessageStep::Handled(outcome) => {
                    if let Some(ref e) = outcome.error {
                        warn!(%run_id, id = %id, stage = ?outcome.stage, error = %e, "Message failed");
                    }
                    tally.outcomes.push(outcome);
                }
            }
        }

        Ok(tally)
    }

    async fn process_message(
        &self,
        session: &mut dyn MailboxSession,
        config: &CycleConfig,
        id: &str,
    ) -> MessageStep {
        let outcome = ProcessingOutcome::new(id);

        let raw = match session.fetch(id).await {
            Ok(raw) => raw,
            Err(e) => return MessageStep::Handled(outcome.failed(PerMessageError::Fetch(e.to_string()))),
        };
        let message = match parse_inbound(id, &raw) {
            Ok(message) => message,
            Err(e) => return MessageStep::Handled(outcome.failed(e)),
        };

        if !message.subject_matches(&config.subject_marker) {
            debug!(id, subject = %message.subject, "Subject lacks marker; skipping");
            return MessageStep::Skipped;
        }

        MessageStep::Handled(self.handle(session, config, &message, outcome).await)
    }

    /// Classify, draft, reply, forward.
    async fn handle(
        &self,
        session: &mut dyn MailboxSession,
        config: &CycleConfig,
        message: &InboundMessage,
        mut outcome: ProcessingOutcome,
    ) -> ProcessingOutcome {
        outcome.advance(MessageStage::Filtered);

        if message.sender_address.is_empty() {
            return outcome.failed(PerMessageError::MissingSender);
        }

        let department = match self.classifier.classify(&message.body).await {
            Ok(department) => department,
            Err(e) => return outcome.failed(PerMessageError::Classification(e.to_string())),
        };
        outcome.classified_department = Some(department);
        outcome.advance(MessageStage::Classified);

        let draft = self
            .generator
            .draft_or_fallback(&message.body, department)
            .await;
        outcome.reply_accepted = draft.accepted;
        outcome.advance(MessageStage::Drafted);

        let reply = OutgoingMail::reply(&config.service_address, message, &draft.final_text);
        if let Err(e) = self.sender.send(&reply).await {
            return outcome.failed(PerMessageError::ReplySend(e.to_string()));
        }
        outcome.reply_sent = true;
        outcome.advance(MessageStage::Sent);

        // The client has its answer; never reply to this message again.
        if let Err(e) = session.mark_seen(&message.id).await {
            warn!(id = %message.id, error = %e, "Failed to mark message as seen");
        }

        let destination = config.routing.resolve(department, &config.service_address);
        let forward =
            OutgoingMail::forward(&config.service_address, destination, message, &draft.final_text);
        outcome.forwarded_to = Some(destination.to_string());
        if let Err(e) = self.sender.send(&forward).await {
            return outcome.failed(PerMessageError::ForwardSend(e.to_string()));
        }
        outcome.forward_sent = true;
        outcome.advance(MessageStage::Forwarded);

        info!(
            id = %message.id,
            department = %department,
            to = %destination,
            accepted = draft.accepted,
            "Message replied and forwarded"
        );
        outcome.advance(MessageStage::Done);
        outcome
    }
}

/// Any failure while connecting is a connection failure for the cycle.
fn as_connection_error(server: &str, e: MailboxError) -> MailboxError {
    match e {
        MailboxError::Connection { .. } => e,
        other => MailboxError::Connection {
            server: server.to_string(),
            reason: other.to_string(),
        },
    }
}
