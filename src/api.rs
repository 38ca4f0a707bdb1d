//! HTTP surface: single-message processing plus inbox controls.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::department::Department;
use crate::error::InboxError;
use crate::pipeline::classifier::ClassifierAdapter;
use crate::pipeline::email_processor::InboxService;
use crate::pipeline::generator::ReplyGenerator;
use crate::routing::RoutingTable;

/// Shared state for the router's HTTP routes.
#[derive(Clone)]
pub struct ApiState {
    pub classifier: ClassifierAdapter,
    pub generator: ReplyGenerator,
    /// `None` when no mailbox is configured.
    pub inbox: Option<Arc<InboxService>>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessEmailResponse {
    pub department: Department,
    pub reply: String,
}

/// Build the HTTP routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process_email", post(process_email))
        .route("/process_email/", post(process_email))
        .route("/api/inbox/check", post(check_inbox))
        .route("/api/inbox/stats", get(inbox_stats))
        .route("/api/routing", get(get_routing).put(put_routing))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "classifier_loaded": state.classifier.is_loaded(),
        "generator_loaded": state.generator.is_loaded(),
        "inbox_configured": state.inbox.is_some(),
    }))
}

/// POST /process_email/
///
/// Classify and draft a reply for one message. Generation problems degrade to
/// the fallback reply; only a classification failure is an error.
async fn process_email(
    State(state): State<ApiState>,
    Json(body): Json<ProcessEmailRequest>,
) -> Response {
    let email = body.email.trim();
    let department = match state.classifier.classify(email).await {
        Ok(department) => department,
        Err(e) => {
            warn!(error = %e, "Classification unavailable for /process_email");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
        }
    };

    let draft = state
        .generator
        .draft_or_fallback(email, department)
        .await;

    Json(ProcessEmailResponse {
        department,
        reply: draft.final_text,
    })
    .into_response()
}

/// POST /api/inbox/check
///
/// Run a cycle now and return its report.
async fn check_inbox(State(state): State<ApiState>) -> Response {
    let Some(inbox) = state.inbox else {
        return inbox_not_configured();
    };

    match inbox.run_now().await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                processed = report.processed_count,
                "On-demand inbox check finished"
            );
            Json(report).into_response()
        }
        Err(InboxError::CycleInProgress) => {
            error_response(StatusCode::CONFLICT, "An inbox cycle is already running")
        }
        Err(InboxError::Mailbox(e)) => {
            warn!(error = %e, "On-demand inbox check failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn inbox_stats(State(state): State<ApiState>) -> Response {
    match state.inbox {
        Some(inbox) => Json(inbox.stats().await).into_response(),
        None => inbox_not_configured(),
    }
}

async fn get_routing(State(state): State<ApiState>) -> Response {
    match state.inbox {
        Some(inbox) => Json(inbox.routing().await).into_response(),
        None => inbox_not_configured(),
    }
}

/// PUT /api/routing
///
/// Replace the department table. Applies from the next cycle.
async fn put_routing(
    State(state): State<ApiState>,
    Json(routing): Json<RoutingTable>,
) -> Response {
    let Some(inbox) = state.inbox else {
        return inbox_not_configured();
    };
    inbox.set_routing(routing).await;
    Json(inbox.routing().await).into_response()
}

fn inbox_not_configured() -> Response {
    error_response(StatusCode::NOT_FOUND, "No mailbox is configured")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}
