use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ImageViolation, Platform, ProductCategory, Violation};
use crate::moderation::ModerationOutcome;

pub mod gemini;
mod settings;

pub use settings::AnalyzerSettings;

/// Image handed to analyzers and moderation providers.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Url(String),
    Bytes { data: Vec<u8>, mime: String },
}

impl ImageSource {
    /// Display value recorded on the report; raw bytes have no URL.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Bytes { .. } => None,
        }
    }
}

/// Output of a text analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Required statements absent from the copy; these violations carry no
    /// text span.
    #[serde(default)]
    pub missing_disclaimers: Vec<Violation>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl TextAnalysis {
    /// The neutral shape substituted when a modality is absent or failed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty() && self.missing_disclaimers.is_empty()
    }

    /// Boundary validation: every violation must be well-formed against the
    /// analyzed text before it can reach the scorer.
    pub fn validate(&self, analyzed_text: &str) -> Result<()> {
        for violation in &self.violations {
            violation.validate(Some(analyzed_text.len()))?;
        }
        for disclaimer in &self.missing_disclaimers {
            disclaimer.validate(None)?;
        }
        Ok(())
    }
}

/// Output of an image analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    #[serde(default)]
    pub image_violations: Vec<ImageViolation>,
    #[serde(default)]
    pub image_recommendations: Vec<String>,
}

impl ImageAnalysis {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        for violation in &self.image_violations {
            violation.validate()?;
        }
        Ok(())
    }
}

/// Analyzer that inspects marketing copy for policy violations.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze_text(
        &self,
        text: &str,
        platform: Platform,
        category: &ProductCategory,
    ) -> Result<TextAnalysis>;
}

/// Analyzer that inspects a creative image, optionally informed by a prior
/// moderation pass.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze_image(
        &self,
        image: &ImageSource,
        platform: Platform,
        moderation: Option<&ModerationOutcome>,
    ) -> Result<ImageAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn validate_catches_span_past_text() {
        let analysis = TextAnalysis {
            violations: vec![Violation {
                id: "V1".into(),
                severity: Severity::Critical,
                category: "Misleading Claims".into(),
                offending_text: Some("cure".into()),
                start_index: Some(0),
                end_index: Some(99),
                policy_reference: "Policy 1.1".into(),
                policy_description: "claims a cure".into(),
                suggested_fix: "soften the claim".into(),
                confidence: 0.9,
            }],
            missing_disclaimers: vec![],
            recommendations: vec![],
        };
        assert!(analysis.validate("short text").is_err());
    }

    #[test]
    fn empty_analysis_is_valid_and_empty() {
        let empty = TextAnalysis::empty();
        assert!(empty.is_empty());
        empty.validate("anything").unwrap();
    }

    #[test]
    fn text_analysis_parses_camel_case_payload() {
        let raw = r#"{
            "violations": [{
                "id": "v-1",
                "severity": "warning",
                "category": "Misleading Claims",
                "offendingText": "melt fat",
                "startIndex": 4,
                "endIndex": 12,
                "policyReference": "Policy 1.2",
                "policyDescription": "implies effortless weight loss",
                "suggestedFix": "describe realistic outcomes",
                "confidence": 0.8
            }],
            "missingDisclaimers": [],
            "recommendations": ["Add a results-vary disclaimer"]
        }"#;
        let parsed: TextAnalysis = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.violations.len(), 1);
        assert_eq!(parsed.violations[0].offending_text.as_deref(), Some("melt fat"));
        parsed.validate("body melt fat away").unwrap();
    }
}
