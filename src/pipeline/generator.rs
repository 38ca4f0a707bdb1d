//! Reply generator: prompt → model → sanitizer → quality gate → fallback.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::department::Department;
use crate::error::ModelError;
use crate::models::{GenerationModel, GenerationParams};
use crate::pipeline::quality;
use crate::pipeline::sanitizer::sanitize;

/// Replies at or above this many words are treated as rejected.
pub const MAX_REPLY_WORDS: usize = 1000;

/// Special/control tokens a seq2seq decoder can leak into its output.
static SPECIAL_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?s>|<pad>|<unk>|<mask>|<\|[^|>]*\|>|<extra_id_\d+>")
        .expect("special token pattern is valid")
});

/// A generated reply at each stage of post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyDraft {
    pub raw_text: String,
    pub sanitized_text: String,
    pub accepted: bool,
    /// What gets sent: `sanitized_text` if accepted, else the department fallback.
    pub final_text: String,
}

impl ReplyDraft {
    /// Gate a model output for `department`.
    pub fn from_raw(raw_text: String, department: Department) -> Self {
        let sanitized_text = sanitize(&strip_special_tokens(&raw_text));
        let rejection = quality::check(&sanitized_text);
        let too_long = sanitized_text.split_whitespace().count() >= MAX_REPLY_WORDS;
        let accepted = rejection.is_none() && !too_long;

        if !accepted {
            debug!(
                department = %department,
                rejection = ?rejection,
                too_long,
                "Generated reply rejected; using fallback"
            );
        }

        let final_text = if accepted {
            sanitized_text.clone()
        } else {
            department.fallback_reply()
        };

        Self {
            raw_text,
            sanitized_text,
            accepted,
            final_text,
        }
    }

    /// Draft made directly from the fallback template, with no model output.
    pub fn fallback(department: Department) -> Self {
        Self {
            raw_text: String::new(),
            sanitized_text: String::new(),
            accepted: false,
            final_text: department.fallback_reply(),
        }
    }
}

/// Remove decoder special tokens, leaving surrounding text in place.
pub fn strip_special_tokens(text: &str) -> String {
    SPECIAL_TOKENS.replace_all(text, " ").into_owned()
}

/// Build the generation prompt for a client message.
pub fn build_prompt(email_text: &str, department: Department) -> String {
    format!(
        "You are a {name} representative writing directly to a client.\n\
         Guidance: {guidance}\n\
         Client message: \"{email_text}\"\n\n\
         Compose a short, warm, and professional reply that\n\
         - thanks them for reaching out,\n\
         - mentions the {name} team will assist further,\n\
         - and offers a clear, concrete next step.\n\
         Do not apologize. Keep it under {MAX_REPLY_WORDS} words, natural and friendly.",
        name = department.name(),
        guidance = department.guidance(),
    )
}

/// Drafts department-aware replies with the generation model.
#[derive(Clone)]
pub struct ReplyGenerator {
    model: Option<Arc<dyn GenerationModel>>,
    params: GenerationParams,
}

impl ReplyGenerator {
    pub fn new(model: Arc<dyn GenerationModel>) -> Self {
        Self::from_model(Some(model))
    }

    /// Generator with no model loaded; every call fails with `ModelError::Unavailable`.
    pub fn unloaded() -> Self {
        Self::from_model(None)
    }

    pub fn from_model(model: Option<Arc<dyn GenerationModel>>) -> Self {
        Self {
            model,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Generate the reply text that should be sent.
    pub async fn generate_reply(
        &self,
        email_text: &str,
        department: Department,
    ) -> Result<String, ModelError> {
        Ok(self.draft(email_text, department).await?.final_text)
    }

    /// Generate and keep every intermediate stage.
    pub async fn draft(
        &self,
        email_text: &str,
        department: Department,
    ) -> Result<ReplyDraft, ModelError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ModelError::unavailable("generator", "no generation model loaded"))?;

        let prompt = build_prompt(email_text, department);
        let raw = model.generate(&prompt, &self.params).await?;
        let draft = ReplyDraft::from_raw(raw, department);

        info!(
            model = model.model_name(),
            department = %department,
            accepted = draft.accepted,
            "Drafted reply"
        );
        Ok(draft)
    }

    /// Draft a reply, substituting the fallback template when the model is down.
    pub async fn draft_or_fallback(&self, email_text: &str, department: Department) -> ReplyDraft {
        match self.draft(email_text, department).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(department = %department, error = %e, "Generation unavailable; using fallback");
                ReplyDraft::fallback(department)
            }
        }
    }
}
