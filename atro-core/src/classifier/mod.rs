//! Free-text security classification.
//!
//! [`Analyzer::analyze`] never fails: any classifier error or timeout is
//! logged and replaced by [`Classification::fallback`].

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use atro_config::ClassifierConfig;
use atro_model::Severity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub mod openai;

pub use openai::OpenAiClassifier;

pub const FALLBACK_ANALYSIS: &str =
    "Automated analysis is unavailable for this entry.";
pub const FALLBACK_RECOMMENDATION: &str =
    "Review the entry manually and correlate with related alerts.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub severity: Severity,
    pub analysis: String,
    pub recommendation: String,
    /// In `0.0..=1.0`.
    pub confidence: f64,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            severity: Severity::Medium,
            analysis: FALLBACK_ANALYSIS.to_string(),
            recommendation: FALLBACK_RECOMMENDATION.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == 0.0 && self.analysis == FALLBACK_ANALYSIS
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier disabled: no API key configured")]
    Disabled,

    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    Malformed(String),

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Classifier: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str)
    -> Result<Classification, ClassifierError>;
}

/// Used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn classify(
        &self,
        _text: &str,
    ) -> Result<Classification, ClassifierError> {
        Err(ClassifierError::Disabled)
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// OpenAI-compatible classifier when a key is set, otherwise disabled.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let classifier: Arc<dyn Classifier> = match &config.api_key {
            Some(key) => {
                info!(model = %config.model, "classifier enabled");
                Arc::new(OpenAiClassifier::new(
                    key.clone(),
                    config.model.clone(),
                    config.base_url.clone(),
                    config.timeout,
                )?)
            }
            None => Arc::new(DisabledClassifier),
        };
        Ok(Self::new(classifier, config.timeout))
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub async fn analyze(&self, text: &str) -> Classification {
        let outcome = match tokio::time::timeout(
            self.timeout,
            self.classifier.classify(text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(classification) => classification,
            Err(ClassifierError::Disabled) => Classification::fallback(),
            Err(err) => {
                warn!(
                    classifier = self.classifier.name(),
                    error = %err,
                    "classification failed; using default"
                );
                Classification::fallback()
            }
        }
    }
}
