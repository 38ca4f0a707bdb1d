//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use inbox_router::channels::{MailSender, Mailbox, MailboxSession};
use inbox_router::error::{MailboxError, ModelError};
use inbox_router::models::{ClassificationModel, GenerationModel, GenerationParams, LabelScore};
use inbox_router::pipeline::types::OutgoingMail;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const SERVICE_ADDRESS: &str = "router@corp.test";

/// Build a plain-text RFC 822 message.
pub fn raw_email(from: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: {SERVICE_ADDRESS}\r\nSubject: {subject}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n"
    )
    .into_bytes()
}

// ── Mailbox ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredMail {
    pub id: String,
    pub raw: Vec<u8>,
    pub seen: bool,
}

#[derive(Debug, Default)]
pub struct MailboxState {
    pub messages: Vec<StoredMail>,
    pub fetched: Vec<String>,
    pub connects: usize,
    pub disconnects: usize,
    pub fail_connect: bool,
    pub fail_list: bool,
    pub fail_fetch: HashSet<String>,
}

/// Mailbox backed by a shared in-memory state.
#[derive(Clone, Default)]
pub struct MemoryMailbox {
    pub state: Arc<Mutex<MailboxState>>,
    /// When set, `connect` waits for a notification before proceeding.
    pub gate: Option<Arc<Notify>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(self, id: &str, raw: Vec<u8>) -> Self {
        self.state.lock().unwrap().messages.push(StoredMail {
            id: id.to_string(),
            raw,
            seen: false,
        });
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_fetch(&self, id: &str) {
        self.state.lock().unwrap().fail_fetch.insert(id.to_string());
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .any(|m| m.id == id && m.seen)
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    fn server(&self) -> &str {
        "memory.test"
    }

    async fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(MailboxError::Connection {
                server: "memory.test".into(),
                reason: "authentication rejected".into(),
            });
        }
        state.connects += 1;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MailboxState>>,
}

#[async_trait]
impl MailboxSession for MemorySession {
    async fn list_unread(&mut self) -> Result<Vec<String>, MailboxError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(MailboxError::Command {
                command: "SEARCH".into(),
                reason: "mailbox gone".into(),
            });
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| !m.seen)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_fetch.contains(id) {
            return Err(MailboxError::Command {
                command: "FETCH".into(),
                reason: format!("no such message {id}"),
            });
        }
        state.fetched.push(id.to_string());
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.raw.clone())
            .ok_or_else(|| MailboxError::Command {
                command: "FETCH".into(),
                reason: format!("no such message {id}"),
            })
    }

    async fn mark_seen(&mut self, id: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.messages.iter_mut().find(|m| m.id == id) {
            m.seen = true;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MailboxError> {
        self.state.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

// ── Sender ──────────────────────────────────────────────────────────

/// Records every send; refuses mail to the addresses in `fail_to`.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<OutgoingMail>>,
    pub attempts: Mutex<Vec<OutgoingMail>>,
    pub fail_to: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(addresses: &[&str]) -> Arc<Self> {
        let sender = Self::default();
        sender
            .fail_to
            .lock()
            .unwrap()
            .extend(addresses.iter().map(|a| a.to_string()));
        Arc::new(sender)
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> Vec<OutgoingMail> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingSender {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        self.attempts.lock().unwrap().push(mail.clone());
        if self.fail_to.lock().unwrap().contains(&mail.to) {
            return Err(MailboxError::SendFailed {
                to: mail.to.clone(),
                reason: "550 mailbox unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Delivers every mail, but parks a send to `stall_to` until `release` is
/// notified. `reached` is notified when that send begins.
pub struct StallingSender {
    pub stall_to: String,
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl StallingSender {
    pub fn new(stall_to: &str) -> Arc<Self> {
        Arc::new(Self {
            stall_to: stall_to.to_string(),
            reached: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for StallingSender {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        if mail.to == self.stall_to {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

// ── Models ──────────────────────────────────────────────────────────

/// Scores by keyword: invoice/refund → Billing, vacation/payroll → HR,
/// quote/pricing → Sales, otherwise Support.
pub struct KeywordClassifier;

#[async_trait]
impl ClassificationModel for KeywordClassifier {
    fn model_name(&self) -> &str {
        "keyword-classifier"
    }

    async fn scores(&self, text: &str) -> Result<Vec<LabelScore>, ModelError> {
        let lower = text.to_lowercase();
        let hit = |words: &[&str]| {
            if words.iter().any(|w| lower.contains(w)) {
                0.9
            } else {
                0.02
            }
        };
        Ok(vec![
            LabelScore {
                label: "LABEL_0".into(),
                score: hit(&["quote", "pricing"]),
            },
            LabelScore {
                label: "LABEL_1".into(),
                score: hit(&["invoice", "refund"]),
            },
            LabelScore {
                label: "LABEL_2".into(),
                score: hit(&["vacation", "payroll"]),
            },
            LabelScore {
                label: "LABEL_3".into(),
                score: 0.05,
            },
        ])
    }
}

/// Always answers with the same text.
pub struct CannedGenerator(pub String);

#[async_trait]
impl GenerationModel for CannedGenerator {
    fn model_name(&self) -> &str {
        "canned-generator"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelError> {
        Ok(self.0.clone())
    }
}

/// Answers with canned text and keeps every prompt it was given.
pub struct RecordingGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationModel for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-generator"
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Generation backend that is always down.
pub struct DownGenerator;

#[async_trait]
impl GenerationModel for DownGenerator {
    fn model_name(&self) -> &str {
        "down-generator"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelError> {
        Err(ModelError::unavailable("down-generator", "connection refused"))
    }
}

pub const GOOD_REPLY: &str = "<pad> Thank you for contacting us. Our team will review the charge \
                              and follow up within one business day.</s>";
