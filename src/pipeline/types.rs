//! Shared types for the inbox pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::department::Department;
use crate::error::PerMessageError;

// ── Inbound message ─────────────────────────────────────────────────

/// A client message fetched from the service mailbox.
///
/// Built once by the transport layer, consumed once by the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Mailbox-assigned identifier (IMAP UID for the built-in transport).
    pub id: String,
    /// Sender address; empty when the From header carried none.
    pub sender_address: String,
    pub subject: String,
    /// First text/plain part, or empty.
    pub body: String,
}

impl InboundMessage {
    /// Case-insensitive substring match of `marker` against the subject.
    pub fn subject_matches(&self, marker: &str) -> bool {
        self.subject.to_lowercase().contains(&marker.to_lowercase())
    }
}

// ── Outgoing mail ───────────────────────────────────────────────────

/// A plain-text message to send through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Automated reply to the client.
    pub fn reply(service_address: &str, message: &InboundMessage, reply: &str) -> Self {
        Self {
            from: service_address.to_string(),
            to: message.sender_address.clone(),
            subject: format!("Re: {}", message.subject),
            body: reply.to_string(),
        }
    }

    /// Summary forwarded to the department inbox.
    pub fn forward(
        service_address: &str,
        destination: &str,
        message: &InboundMessage,
        reply: &str,
    ) -> Self {
        Self {
            from: service_address.to_string(),
            to: destination.to_string(),
            subject: format!("FWD: {}", message.subject),
            body: format!(
                "Client Email: {}\nSubject: {}\n\nOriginal inquiry:\n{}\n\nAutomated reply:\n{}",
                message.sender_address, message.subject, message.body, reply
            ),
        }
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Furthest step a filtered message reached within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStage {
    Fetched,
    Filtered,
    Classified,
    Drafted,
    Sent,
    Forwarded,
    Done,
}

/// What happened to one filtered message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    pub message_id: String,
    pub stage: MessageStage,
    pub classified_department: Option<Department>,
    /// Whether the generated reply passed the quality gate.
    pub reply_accepted: bool,
    pub reply_sent: bool,
    pub forward_sent: bool,
    pub forwarded_to: Option<String>,
    pub error: Option<PerMessageError>,
}

impl ProcessingOutcome {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            stage: MessageStage::Fetched,
            classified_department: None,
            reply_accepted: false,
            reply_sent: false,
            forward_sent: false,
            forwarded_to: None,
            error: None,
        }
    }

    pub fn failed(mut self, error: PerMessageError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn advance(&mut self, stage: MessageStage) {
        self.stage = stage;
    }

    /// Both sends succeeded.
    pub fn is_success(&self) -> bool {
        self.reply_sent && self.forward_sent && self.error.is_none()
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Unread messages in the snapshot taken at cycle start.
    pub listed: usize,
    /// Messages whose subject did not carry the marker.
    pub skipped: usize,
    /// Messages left for the next cycle because the time budget ran out.
    pub deferred: usize,
    /// Messages where both sends succeeded.
    pub processed_count: usize,
    /// One entry per filtered message, in listing order.
    pub outcomes: Vec<ProcessingOutcome>,
}

impl CycleReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}
