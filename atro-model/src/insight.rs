use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::{IncidentId, InsightId},
    patch::{Patch, double_option},
    status::Severity,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: InsightId,
    pub analysis: String,
    pub severity: Severity,
    pub recommendation: Option<String>,
    pub incident_id: Option<IncidentId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInsight {
    pub analysis: String,
    pub severity: Severity,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommendation: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub incident_id: Option<Option<IncidentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Patch for InsightPatch {
    fn is_empty(&self) -> bool {
        self.analysis.is_none()
            && self.severity.is_none()
            && self.recommendation.is_none()
            && self.incident_id.is_none()
            && self.metadata.is_none()
    }
}

impl Insight {
    pub fn apply(&mut self, patch: InsightPatch) {
        if let Some(analysis) = patch.analysis {
            self.analysis = analysis;
        }
        if let Some(severity) = patch.severity {
            self.severity = severity;
        }
        if let Some(recommendation) = patch.recommendation {
            self.recommendation = recommendation;
        }
        if let Some(incident_id) = patch.incident_id {
            self.incident_id = incident_id;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}
