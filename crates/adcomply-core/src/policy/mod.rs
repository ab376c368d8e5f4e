use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::model::{Platform, ProductCategory, Severity};

pub mod file_catalog;
pub mod rule_engine;

/// How a rule is enforced against a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ProhibitedClaim,
    RequiredDisclaimer,
    RestrictedImagery,
    PlatformSpecific,
}

/// Applicability filter: either everything, or an explicit allow-list.
/// Serialized as the string `"all"` or a JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability<T> {
    All,
    Only(Vec<T>),
}

impl<T: PartialEq> Applicability<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Self::All => true,
            Self::Only(items) => items.contains(value),
        }
    }
}

impl<T: Serialize> Serialize for Applicability<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Only(items) => items.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Applicability<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Keyword(String),
            List(Vec<T>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Keyword(word) if word == "all" => Ok(Self::All),
            Raw::Keyword(word) => Err(D::Error::custom(format!(
                "expected \"all\" or a list, got `{word}`"
            ))),
            Raw::List(items) => Ok(Self::Only(items)),
        }
    }
}

/// A static compliance rule from the policy catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Unique identifier (namespaced, e.g. `CLAIM_GUARANTEED_CURE`).
    pub id: String,
    /// Grouping label carried onto violations, e.g. "Misleading Claims".
    pub category: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub severity: Severity,
    /// Optional regex applied to the submission text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Optional literal keywords matched case-insensitively.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    pub description: String,
    pub policy_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_alternative: Option<String>,
    pub platforms: Applicability<Platform>,
    pub product_categories: Applicability<ProductCategory>,
}

impl PolicyRule {
    /// Validate invariants for catalog entries before they are served.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if self.id.trim().is_empty() {
            return Err(RuleValidationError::EmptyId);
        }
        if self.description.trim().is_empty() {
            return Err(RuleValidationError::EmptyDescription {
                rule_id: self.id.clone(),
            });
        }
        if let Some(pattern) = &self.pattern {
            if pattern.is_empty() {
                return Err(RuleValidationError::EmptyPattern {
                    rule_id: self.id.clone(),
                });
            }
        }
        if let Some(keywords) = &self.keywords {
            if keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(RuleValidationError::BlankKeyword {
                    rule_id: self.id.clone(),
                });
            }
        }
        if matches!(self.kind, RuleKind::RequiredDisclaimer)
            && self.keywords.as_ref().map_or(true, |k| k.is_empty())
        {
            return Err(RuleValidationError::DisclaimerWithoutKeywords {
                rule_id: self.id.clone(),
            });
        }
        Ok(())
    }

    pub fn applies_to(&self, platform: Platform, category: &ProductCategory) -> bool {
        self.platforms.admits(&platform) && self.product_categories.admits(category)
    }
}

/// Errors emitted while validating catalog entries.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleValidationError {
    #[error("rule id must not be blank")]
    EmptyId,
    #[error("rule `{rule_id}` description must not be empty")]
    EmptyDescription { rule_id: String },
    #[error("rule `{rule_id}` pattern must not be empty when specified")]
    EmptyPattern { rule_id: String },
    #[error("rule `{rule_id}` keyword list contains a blank entry")]
    BlankKeyword { rule_id: String },
    #[error("required-disclaimer rule `{rule_id}` must list detection keywords")]
    DisclaimerWithoutKeywords { rule_id: String },
}

/// Filter the catalog down to the rules relevant to a submission. Stable:
/// catalog insertion order is preserved, and an empty result is valid.
pub fn select_rules(
    catalog: &[PolicyRule],
    platform: Platform,
    category: &ProductCategory,
) -> Vec<PolicyRule> {
    catalog
        .iter()
        .filter(|rule| rule.applies_to(platform, category))
        .cloned()
        .collect()
}

/// Abstraction over catalog loading so different backends (files, HTTP,
/// in-memory) can be swapped transparently.
#[async_trait]
pub trait PolicyCatalog: Send + Sync {
    /// Retrieve the full catalog in insertion order.
    async fn load_rules(&self) -> AnyResult<Vec<PolicyRule>>;

    /// Fetch a single rule by identifier if it exists.
    async fn get_rule(&self, rule_id: &str) -> AnyResult<Option<PolicyRule>>;
}

#[cfg(test)]
pub(crate) fn test_rule(id: &str, platforms: Applicability<Platform>) -> PolicyRule {
    PolicyRule {
        id: id.into(),
        category: "Misleading Claims".into(),
        kind: RuleKind::ProhibitedClaim,
        severity: Severity::Critical,
        pattern: None,
        keywords: Some(vec!["guaranteed cure".into()]),
        description: "Promises a guaranteed cure".into(),
        policy_reference: "Policy 1.1 – Unsubstantiated Claims".into(),
        suggested_alternative: Some("may support".into()),
        platforms,
        product_categories: Applicability::All,
    }
}
