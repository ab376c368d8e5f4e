use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordinal urgency of a detected issue, ordered by decreasing impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Advertising platform a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Google,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Google => "google",
            Self::Tiktok => "tiktok",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "meta" => Ok(Self::Meta),
            "google" => Ok(Self::Google),
            "tiktok" => Ok(Self::Tiktok),
            other => Err(format!(
                "unknown platform `{other}` (expected meta, google, or tiktok)"
            )),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product category: a fixed predefined set plus sanitized custom strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductCategory {
    ErectileDysfunction,
    HairLoss,
    WeightLoss,
    Skincare,
    Supplements,
    MentalHealth,
    Custom(String),
}

impl ProductCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ErectileDysfunction => "erectile_dysfunction",
            Self::HairLoss => "hair_loss",
            Self::WeightLoss => "weight_loss",
            Self::Skincare => "skincare",
            Self::Supplements => "supplements",
            Self::MentalHealth => "mental_health",
            Self::Custom(name) => name,
        }
    }

    /// Validate a custom category string against the submission input contract:
    /// 3–50 chars, alphanumerics/spaces/hyphens/apostrophes/parentheses only.
    pub fn validate_custom(name: &str) -> Result<(), CategoryError> {
        let len = name.chars().count();
        if !(3..=50).contains(&len) {
            return Err(CategoryError::InvalidLength { len });
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, ' ' | '-' | '\'' | '(' | ')' | '_')))
        {
            return Err(CategoryError::InvalidCharacter { ch });
        }
        Ok(())
    }
}

impl From<String> for ProductCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "erectile_dysfunction" => Self::ErectileDysfunction,
            "hair_loss" => Self::HairLoss,
            "weight_loss" => Self::WeightLoss,
            "skincare" => Self::Skincare,
            "supplements" => Self::Supplements,
            "mental_health" => Self::MentalHealth,
            _ => Self::Custom(value),
        }
    }
}

impl From<ProductCategory> for String {
    fn from(value: ProductCategory) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for custom category strings that fail the input contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CategoryError {
    #[error("custom category must be 3-50 characters (got {len})")]
    InvalidLength { len: usize },
    #[error("custom category contains disallowed character `{ch}`")]
    InvalidCharacter { ch: char },
}

/// A single detected compliance issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Unique identifier. Analyzers may omit it; the adapter backfills.
    #[serde(default)]
    pub id: String,
    pub severity: Severity,
    /// Free-text grouping label, e.g. "Drug-Related Content".
    pub category: String,
    /// Offending span into the analyzed text; absent for image-only and
    /// missing-disclaimer violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offending_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
    pub policy_reference: String,
    pub policy_description: String,
    pub suggested_fix: String,
    /// Analyzer certainty in `[0, 1]`.
    pub confidence: f32,
}

impl Violation {
    /// Validate bounds at the analyzer boundary. `analyzed_len` is the byte
    /// length of the text the span indexes into, when known.
    pub fn validate(&self, analyzed_len: Option<usize>) -> Result<(), ViolationValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ViolationValidationError::InvalidConfidence {
                violation_id: self.id.clone(),
                confidence: self.confidence,
            });
        }
        match (self.start_index, self.end_index) {
            (None, None) => {}
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(ViolationValidationError::InvalidSpan {
                        violation_id: self.id.clone(),
                        start,
                        end,
                    });
                }
                if let Some(len) = analyzed_len {
                    if end > len {
                        return Err(ViolationValidationError::SpanOutOfBounds {
                            violation_id: self.id.clone(),
                            end,
                            len,
                        });
                    }
                }
            }
            _ => {
                return Err(ViolationValidationError::HalfOpenSpan {
                    violation_id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The pair the scorer consumes.
    pub fn signal(&self) -> (Severity, f32) {
        (self.severity, self.confidence)
    }

    /// Drop span fields, turning a text violation into a span-less one
    /// (the shape missing-disclaimer violations carry).
    pub fn without_span(mut self) -> Self {
        self.offending_text = None;
        self.start_index = None;
        self.end_index = None;
        self
    }
}

/// Validation errors for violations handed in by analyzers.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationValidationError {
    #[error("violation `{violation_id}` confidence must be within 0.0..=1.0 (got {confidence})")]
    InvalidConfidence { violation_id: String, confidence: f32 },
    #[error("violation `{violation_id}` span start {start} exceeds end {end}")]
    InvalidSpan {
        violation_id: String,
        start: usize,
        end: usize,
    },
    #[error("violation `{violation_id}` span end {end} exceeds analyzed text length {len}")]
    SpanOutOfBounds {
        violation_id: String,
        end: usize,
        len: usize,
    },
    #[error("violation `{violation_id}` has only one of startIndex/endIndex")]
    HalfOpenSpan { violation_id: String },
    #[error("image violation `{violation_id}` region percentage out of 0..=100 (got {value})")]
    InvalidRegion { violation_id: String, value: f32 },
}

/// Classification of what is wrong with an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageIssueType {
    BeforeAfter,
    Nudity,
    NegativeBodyImage,
    GraphicContent,
    MisleadingImagery,
}

/// Bounding box as percentages of the image dimensions, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImageRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ImageRegion {
    fn out_of_bounds(&self) -> Option<f32> {
        [self.x, self.y, self.width, self.height]
            .into_iter()
            .find(|v| !(0.0..=100.0).contains(v))
    }
}

/// A violation detected in a creative image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageViolation {
    #[serde(flatten)]
    pub violation: Violation,
    pub image_issue_type: ImageIssueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_region: Option<ImageRegion>,
    /// Reference URL for the policy citation, when the analyzer supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ImageViolation {
    pub fn validate(&self) -> Result<(), ViolationValidationError> {
        self.violation.validate(None)?;
        if let Some(region) = &self.image_region {
            if let Some(value) = region.out_of_bounds() {
                return Err(ViolationValidationError::InvalidRegion {
                    violation_id: self.violation.id.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn signal(&self) -> (Severity, f32) {
        self.violation.signal()
    }
}

pub(crate) fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(confidence: f32, span: Option<(usize, usize)>) -> Violation {
        Violation {
            id: "V1".into(),
            severity: Severity::Warning,
            category: "Misleading Claims".into(),
            offending_text: span.map(|_| "cure".into()),
            start_index: span.map(|s| s.0),
            end_index: span.map(|s| s.1),
            policy_reference: "Policy 1.1".into(),
            policy_description: "claims a cure".into(),
            suggested_fix: "say 'may help'".into(),
            confidence,
        }
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let err = violation(1.2, None).validate(None).unwrap_err();
        assert!(matches!(
            err,
            ViolationValidationError::InvalidConfidence { confidence, .. } if confidence > 1.0
        ));
    }

    #[test]
    fn validate_rejects_inverted_span() {
        let err = violation(0.9, Some((10, 4))).validate(Some(20)).unwrap_err();
        assert!(matches!(
            err,
            ViolationValidationError::InvalidSpan { start: 10, end: 4, .. }
        ));
    }

    #[test]
    fn validate_rejects_span_past_text_end() {
        let err = violation(0.9, Some((0, 30))).validate(Some(20)).unwrap_err();
        assert!(matches!(
            err,
            ViolationValidationError::SpanOutOfBounds { end: 30, len: 20, .. }
        ));
    }

    #[test]
    fn validate_rejects_half_open_span() {
        let mut v = violation(0.9, Some((0, 4)));
        v.end_index = None;
        assert!(matches!(
            v.validate(Some(20)).unwrap_err(),
            ViolationValidationError::HalfOpenSpan { .. }
        ));
    }

    #[test]
    fn validate_accepts_spanless_disclaimer_shape() {
        violation(1.0, None).validate(Some(0)).unwrap();
    }

    #[test]
    fn image_region_bounds_checked() {
        let iv = ImageViolation {
            violation: violation(0.5, None),
            image_issue_type: ImageIssueType::BeforeAfter,
            image_region: Some(ImageRegion {
                x: 0.0,
                y: 0.0,
                width: 120.0,
                height: 10.0,
            }),
            source_url: None,
        };
        assert!(matches!(
            iv.validate().unwrap_err(),
            ViolationValidationError::InvalidRegion { value, .. } if value > 100.0
        ));
    }

    #[test]
    fn custom_category_sanitation() {
        ProductCategory::validate_custom("women's health (otc)").unwrap();
        assert!(matches!(
            ProductCategory::validate_custom("ab"),
            Err(CategoryError::InvalidLength { len: 2 })
        ));
        assert!(matches!(
            ProductCategory::validate_custom("bad;category"),
            Err(CategoryError::InvalidCharacter { ch: ';' })
        ));
    }

    #[test]
    fn product_category_round_trips_through_strings() {
        let parsed: ProductCategory = "weight_loss".to_string().into();
        assert_eq!(parsed, ProductCategory::WeightLoss);
        let custom: ProductCategory = "sleep aids".to_string().into();
        assert_eq!(custom.as_str(), "sleep aids");
    }
}
