use std::time::Duration;

use async_trait::async_trait;
use atro_model::Severity;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Classification, Classifier, ClassifierError};

const SYSTEM_PROMPT: &str = "You are a security operations analyst. \
Classify the security event you are given. Respond with a JSON object \
containing exactly these fields: \"severity\" (one of \"low\", \"medium\", \
\"high\", \"critical\"), \"analysis\" (a short explanation of what the \
event indicates), \"recommendation\" (the next action an operator should \
take) and \"confidence\" (a number between 0 and 1).";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClassifier {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiClassifier {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(
        &self,
        text: &str,
    ) -> Result<Classification, ClassifierError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = %self.model, text_length = text.len(), "calling classifier");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Malformed("no choices".into()))?;

        parse_content(&content)
    }
}

/// Interpret the model's JSON answer, tolerating loose severity spelling
/// and out-of-range confidence.
pub(crate) fn parse_content(content: &str) -> Result<Classification, ClassifierError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|err| ClassifierError::Malformed(err.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ClassifierError::Malformed("expected a JSON object".into()))?;

    let analysis = object
        .get("analysis")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|analysis| !analysis.is_empty())
        .ok_or_else(|| ClassifierError::Malformed("missing analysis".into()))?
        .to_string();

    let severity = object
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim().to_ascii_lowercase().parse::<Severity>().ok())
        .unwrap_or(Severity::Medium);

    let recommendation = object
        .get("recommendation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|confidence| confidence.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Ok(Classification {
        severity,
        analysis,
        recommendation,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_content() {
        let parsed = parse_content(
            r#"{"severity":"HIGH","analysis":" Brute force ","recommendation":"Lock the account","confidence":1.7}"#,
        )
        .unwrap();
        assert_eq!(parsed.severity, Severity::High);
        assert_eq!(parsed.analysis, "Brute force");
        assert_eq!(parsed.recommendation, "Lock the account");
        assert_eq!(parsed.confidence, 1.0);
    }

    #[test]
    fn unknown_severity_defaults_to_medium() {
        let parsed =
            parse_content(r#"{"severity":"severe","analysis":"x"}"#).unwrap();
        assert_eq!(parsed.severity, Severity::Medium);
        assert_eq!(parsed.confidence, 0.0);
    }

    #[test]
    fn rejects_content_without_analysis() {
        assert!(matches!(
            parse_content(r#"{"severity":"low"}"#),
            Err(ClassifierError::Malformed(_))
        ));
        assert!(matches!(
            parse_content("not json"),
            Err(ClassifierError::Malformed(_))
        ));
    }
}
