//! Classifier adapter: stable "text → department" contract over the model.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::department::Department;
use crate::error::ModelError;
use crate::models::{ClassificationModel, LabelScore};

/// Outcome of classifying one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Arg-max department (ties go to the lowest label index).
    pub department: Department,
    /// Scores per recognized label, in label-index order. Not used for gating.
    pub raw_scores: Vec<(Department, f32)>,
}

/// Wraps the external classification model.
#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Option<Arc<dyn ClassificationModel>>,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn ClassificationModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Adapter with no model loaded; every call fails with `ModelError::Unavailable`.
    pub fn unloaded() -> Self {
        Self { model: None }
    }

    pub fn from_model(model: Option<Arc<dyn ClassificationModel>>) -> Self {
        Self { model }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Classify `text` into exactly one department.
    pub async fn classify(&self, text: &str) -> Result<Department, ModelError> {
        Ok(self.classify_detailed(text).await?.department)
    }

    /// Classify and keep the per-label scores.
    pub async fn classify_detailed(&self, text: &str) -> Result<ClassificationResult, ModelError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ModelError::unavailable("classifier", "no classification model loaded"))?;

        let input = fit_to_window(text, model.max_input_tokens());
        let scores = model.scores(&input).await?;
        let result = pick_department(&scores);

        debug!(
            model = model.model_name(),
            department = %result.department,
            labels = scores.len(),
            "Classified text"
        );
        Ok(result)
    }
}

/// Fit text to the model's input window: whitespace tokens beyond `max_tokens`
/// are dropped. Padding up to the window is requested from the model side, so
/// identical text always produces an identical request.
pub fn fit_to_window(text: &str, max_tokens: usize) -> String {
    text.split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Arg-max over the four department labels.
///
/// Unknown labels and NaN scores are ignored. Ties go to the lowest label
/// index; no usable score at all defaults to Support.
pub fn pick_department(scores: &[LabelScore]) -> ClassificationResult {
    let mut per_department: [Option<f32>; 4] = [None; 4];
    for entry in scores {
        let Some(department) = Department::from_label(&entry.label) else {
            debug!(label = %entry.label, "Ignoring unknown classification label");
            continue;
        };
        if entry.score.is_nan() {
            continue;
        }
        let slot = &mut per_department[department.index()];
        *slot = Some(slot.map_or(entry.score, |s| s.max(entry.score)));
    }

    let raw_scores: Vec<(Department, f32)> = Department::ALL
        .into_iter()
        .filter_map(|d| per_department[d.index()].map(|s| (d, s)))
        .collect();

    let mut best: Option<(Department, f32)> = None;
    for &(department, score) in &raw_scores {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((department, score)),
        }
    }

    let department = match best {
        Some((department, _)) => department,
        None => {
            warn!("Classifier returned no usable scores; defaulting to {}", Department::DEFAULT);
            Department::DEFAULT
        }
    };

    ClassificationResult {
        department,
        raw_scores,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    fn score(label: &str, score: f32) -> LabelScore {
        LabelScore {
            label: label.into(),
            score,
        }
    }

    /// Scores by keyword, recording every input it sees.
    struct KeywordModel {
        inputs: Mutex<Vec<String>>,
        window: usize,
    }

    #[async_trait]
    impl ClassificationModel for KeywordModel {
        fn model_name(&self) -> &str {
            "keyword"
        }

        fn max_input_tokens(&self) -> usize {
            self.window
        }

        async fn scores(&self, text: &str) -> Result<Vec<LabelScore>, ModelError> {
            self.inputs.lock().unwrap().push(text.to_string());
            let lower = text.to_lowercase();
            let billing = if lower.contains("invoice") { 0.9 } else { 0.1 };
            Ok(vec![
                score("LABEL_0", 0.05),
                score("LABEL_1", billing),
                score("LABEL_2", 0.02),
                score("LABEL_3", 0.3),
            ])
        }
    }

    fn keyword_adapter(window: usize) -> (ClassifierAdapter, Arc<KeywordModel>) {
        let model = Arc::new(KeywordModel {
            inputs: Mutex::new(Vec::new()),
            window,
        });
        (ClassifierAdapter::new(model.clone()), model)
    }

    #[test]
    fn argmax_picks_highest() {
        let result = pick_department(&[
            score("LABEL_0", 0.1),
            score("LABEL_1", 0.7),
            score("LABEL_2", 0.1),
            score("LABEL_3", 0.1),
        ]);
        assert_eq!(result.department, Department::Billing);
        assert_eq!(result.raw_scores.len(), 4);
        assert_eq!(result.raw_scores[0].0, Department::Sales);
    }

    #[test]
    fn tie_goes_to_lowest_index() {
        let result = pick_department(&[
            score("LABEL_3", 0.4),
            score("LABEL_2", 0.4),
            score("LABEL_0", 0.1),
        ]);
        assert_eq!(result.department, Department::Hr);
    }

    #[test]
    fn empty_or_unknown_scores_default_to_support() {
        assert_eq!(pick_department(&[]).department, Department::Support);
        assert_eq!(
            pick_department(&[score("LABEL_7", 0.99), score("Legal", 0.5)]).department,
            Department::Support
        );
    }

    #[test]
    fn nan_scores_are_ignored() {
        let result = pick_department(&[score("LABEL_0", f32::NAN), score("LABEL_2", 0.2)]);
        assert_eq!(result.department, Department::Hr);
        assert_eq!(result.raw_scores, vec![(Department::Hr, 0.2)]);
    }

    #[test]
    fn window_truncates_deterministically() {
        assert_eq!(fit_to_window("a  b\nc d e", 3), "a b c");
        assert_eq!(fit_to_window("short", 128), "short");
        assert_eq!(fit_to_window("", 128), "");
    }

    #[tokio::test]
    async fn unloaded_model_is_distinct_error() {
        let adapter = ClassifierAdapter::unloaded();
        assert!(!adapter.is_loaded());
        let err = adapter.classify("anything").await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn invoice_text_classifies_as_billing() {
        let (adapter, _) = keyword_adapter(128);
        let department = adapter
            .classify("My invoice #4521 shows the wrong amount, please help")
            .await
            .unwrap();
        assert_eq!(department, Department::Billing);
    }

    #[tokio::test]
    async fn identical_input_gives_identical_output() {
        let (adapter, model) = keyword_adapter(4);
        let text = "please look at my invoice and the attached statement";
        let first = adapter.classify_detailed(text).await.unwrap();
        let second = adapter.classify_detailed(text).await.unwrap();
        assert_eq!(first, second);

        let inputs = model.inputs.lock().unwrap();
        assert_eq!(inputs[0], "please look at my");
        assert_eq!(inputs[0], inputs[1]);
        // "invoice" fell outside the window.
        assert_eq!(first.department, Department::Support);
    }

    #[tokio::test]
    async fn every_input_maps_into_the_closed_set() {
        let (adapter, _) = keyword_adapter(128);
        for text in ["", "   ", "hello", "invoice", "ñandú 🚀"] {
            let d = adapter.classify(text).await.unwrap();
            assert!(Department::ALL.contains(&d));
        }
    }
}
