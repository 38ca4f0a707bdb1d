//! Inbox router: classify client email, draft a reply, forward to the department.

pub mod api;
pub mod channels;
pub mod config;
pub mod department;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod routing;
