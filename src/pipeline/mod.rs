//! Inbox processing pipeline.
//!
//! Every filtered message flows through:
//! 1. `ClassifierAdapter::classify()`: department from the body
//! 2. `ReplyGenerator::draft()`: generate, sanitize, quality gate, fallback
//! 3. `InboxProcessor`: reply to the client, forward to the department
//!
//! `InboxService` schedules cycles and keeps the live routing table.

pub mod classifier;
pub mod email_processor;
pub mod generator;
pub mod processor;
pub mod quality;
pub mod sanitizer;
pub mod types;

pub use classifier::{ClassificationResult, ClassifierAdapter};
pub use email_processor::{InboxService, RunStats, spawn_inbox_poller};
pub use generator::{ReplyDraft, ReplyGenerator};
pub use processor::InboxProcessor;
