use std::sync::Arc;

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::RegexBuilder;
use tracing::{debug, instrument, trace};

use super::{PolicyCatalog, PolicyRule, RuleKind};
use crate::analyzer::{TextAnalysis, TextAnalyzer};
use crate::model::{fresh_id, Platform, ProductCategory, Violation};

// Deterministic matches carry fixed confidences: literal keywords are near
// certain, regex patterns slightly less so.
const KEYWORD_CONFIDENCE: f32 = 0.9;
const PATTERN_CONFIDENCE: f32 = 0.8;

/// Offline text analyzer backed by the policy catalog: literal keywords go
/// through one Aho-Corasick automaton, patterns through compiled regexes,
/// and required-disclaimer rules are checked for absence.
pub struct RuleTextAnalyzer<C: PolicyCatalog> {
    catalog: Arc<C>,
}

impl<C: PolicyCatalog> RuleTextAnalyzer<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    fn compile_keyword_automaton(
        rules: &[PolicyRule],
    ) -> Result<Option<(AhoCorasick, Vec<usize>)>> {
        let mut patterns = Vec::new();
        let mut owners = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            if !scans_text(rule) {
                continue;
            }
            for keyword in rule.keywords.iter().flatten() {
                patterns.push(keyword.clone());
                owners.push(idx);
            }
        }
        if patterns.is_empty() {
            return Ok(None);
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(patterns)
            .context("failed to build keyword automaton from policy catalog")?;
        Ok(Some((automaton, owners)))
    }

    fn compile_patterns(rules: &[PolicyRule]) -> Result<Vec<(regex::Regex, usize)>> {
        let mut compiled = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            if !scans_text(rule) {
                continue;
            }
            if let Some(pattern) = &rule.pattern {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid regex pattern for rule {}", rule.id))?;
                compiled.push((regex, idx));
            }
        }
        Ok(compiled)
    }

    fn push_violation(
        violations: &mut Vec<Violation>,
        input: &str,
        rule: &PolicyRule,
        span: (usize, usize),
        confidence: f32,
    ) {
        if span.0 >= span.1 {
            return;
        }
        violations.push(Violation {
            id: fresh_id(),
            severity: rule.severity,
            category: rule.category.clone(),
            offending_text: Some(input[span.0..span.1].to_string()),
            start_index: Some(span.0),
            end_index: Some(span.1),
            policy_reference: rule.policy_reference.clone(),
            policy_description: rule.description.clone(),
            suggested_fix: rule
                .suggested_alternative
                .clone()
                .unwrap_or_else(|| "Remove or rephrase the flagged wording.".into()),
            confidence,
        });
    }

    fn missing_disclaimer(rule: &PolicyRule) -> Violation {
        Violation {
            id: fresh_id(),
            severity: rule.severity,
            category: rule.category.clone(),
            offending_text: None,
            start_index: None,
            end_index: None,
            policy_reference: rule.policy_reference.clone(),
            policy_description: rule.description.clone(),
            suggested_fix: rule
                .suggested_alternative
                .clone()
                .unwrap_or_else(|| "Add the required disclaimer to the copy.".into()),
            confidence: 1.0,
        }
    }
}

fn scans_text(rule: &PolicyRule) -> bool {
    matches!(
        rule.kind,
        RuleKind::ProhibitedClaim | RuleKind::PlatformSpecific
    )
}

#[async_trait]
impl<C> TextAnalyzer for RuleTextAnalyzer<C>
where
    C: PolicyCatalog + 'static,
{
    #[instrument(name = "rule_scan", skip(self, text), fields(text_len = text.len(), %platform))]
    async fn analyze_text(
        &self,
        text: &str,
        platform: Platform,
        category: &ProductCategory,
    ) -> Result<TextAnalysis> {
        let catalog = self.catalog.load_rules().await?;
        let rules = super::select_rules(&catalog, platform, category);
        trace!(selected = rules.len(), "rules selected for submission");

        let mut violations = Vec::new();
        let mut fired = vec![false; rules.len()];

        if let Some((automaton, owners)) = Self::compile_keyword_automaton(&rules)? {
            for mat in automaton.find_iter(text) {
                let rule_idx = owners[mat.pattern().as_usize()];
                let rule = &rules[rule_idx];
                Self::push_violation(
                    &mut violations,
                    text,
                    rule,
                    (mat.start(), mat.end()),
                    KEYWORD_CONFIDENCE,
                );
                fired[rule_idx] = true;
            }
        }

        for (regex, rule_idx) in Self::compile_patterns(&rules)? {
            let rule = &rules[rule_idx];
            trace!(rule_id = %rule.id, "scanning pattern rule");
            for mat in regex.find_iter(text) {
                Self::push_violation(
                    &mut violations,
                    text,
                    rule,
                    (mat.start(), mat.end()),
                    PATTERN_CONFIDENCE,
                );
                fired[rule_idx] = true;
            }
        }

        violations.sort_by(|a, b| {
            a.start_index
                .cmp(&b.start_index)
                .then_with(|| a.end_index.cmp(&b.end_index))
        });

        let mut missing_disclaimers = Vec::new();
        let lowered = text.to_lowercase();
        for rule in rules
            .iter()
            .filter(|rule| matches!(rule.kind, RuleKind::RequiredDisclaimer))
        {
            let present = rule
                .keywords
                .iter()
                .flatten()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()));
            if !present {
                missing_disclaimers.push(Self::missing_disclaimer(rule));
            }
        }

        let recommendations: Vec<String> = rules
            .iter()
            .enumerate()
            .filter(|(idx, _)| fired[*idx])
            .filter_map(|(_, rule)| {
                rule.suggested_alternative
                    .as_ref()
                    .map(|alt| format!("{}: try \"{alt}\" instead.", rule.category))
            })
            .collect();

        debug!(
            violations = violations.len(),
            missing = missing_disclaimers.len(),
            "rule scan completed"
        );

        Ok(TextAnalysis {
            violations,
            missing_disclaimers,
            recommendations,
        })
    }
}
