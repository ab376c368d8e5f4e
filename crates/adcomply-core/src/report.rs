use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::{ImageAnalysis, TextAnalysis};
use crate::model::{fresh_id, ImageViolation, Platform, ProductCategory, Severity, Violation};
use crate::moderation::{ModerationFindings, ModerationScores};
use crate::scoring::{score_violations, ScoringConfig, Status};

/// Prefix applied to violation categories found in OCR-extracted image text.
const IMAGE_TEXT_PREFIX: &str = "Image Text: ";

/// Advisory appended when the moderation safety score falls below this.
const SAFETY_ADVISORY_BELOW: u8 = 80;

const SAFETY_ADVISORY: &str = "Automated image moderation flagged potential risks. \
     Review the creative against platform image policies before publishing.";

const IMAGE_TEXT_ADVISORY: &str = "Text embedded in the image raised compliance issues. \
     Edit or remove the overlaid text before publishing.";

const ALL_CLEAR_SUMMARY: &str =
    "No compliance issues were found. The ad creative looks ready to publish.";

/// The final report entity: created once per submission, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub overall_score: u8,
    pub status: Status,
    pub text_violations: Vec<Violation>,
    pub image_violations: Vec<ImageViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_text_violations: Option<Vec<Violation>>,
    pub platform: Platform,
    pub product_category: ProductCategory,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_image_text: Option<String>,
    pub summary: String,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_moderation_scores: Option<ModerationScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_safety_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_profanity: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profanity_matches: Option<Vec<String>>,
}

/// Submission context stamped onto the report.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub original_text: String,
    pub platform: Platform,
    pub product_category: ProductCategory,
    pub image_url: Option<String>,
}

/// Moderation results carried into assembly: translator output plus the
/// provider passthrough fields.
#[derive(Debug, Clone)]
pub struct ModerationInput {
    pub scores: ModerationScores,
    pub findings: ModerationFindings,
    pub extracted_text: Option<String>,
    pub has_profanity: bool,
    pub profanity_matches: Vec<String>,
}

/// Merge all analysis outputs into one report. Total: never fails; absent
/// modalities are `None` and behave exactly like empty ones.
pub fn assemble(
    context: ReportContext,
    text: TextAnalysis,
    image: Option<ImageAnalysis>,
    moderation: Option<ModerationInput>,
    image_text: Option<TextAnalysis>,
    scoring: &ScoringConfig,
) -> ComplianceReport {
    let mut text_violations = text.violations;
    text_violations.extend(
        text.missing_disclaimers
            .into_iter()
            .map(Violation::without_span),
    );

    let image = image.unwrap_or_default();
    let mut image_violations = image.image_violations;
    if let Some(moderation) = &moderation {
        image_violations.extend(moderation.findings.violations.iter().cloned());
    }

    let image_text_violations = image_text.as_ref().map(|analysis| {
        analysis
            .violations
            .iter()
            .cloned()
            .chain(
                analysis
                    .missing_disclaimers
                    .iter()
                    .cloned()
                    .map(Violation::without_span),
            )
            .map(|mut violation| {
                violation.category = format!("{IMAGE_TEXT_PREFIX}{}", violation.category);
                violation
            })
            .collect::<Vec<_>>()
    });

    let signals = text_violations
        .iter()
        .map(Violation::signal)
        .chain(image_violations.iter().map(ImageViolation::signal))
        .chain(
            image_text_violations
                .iter()
                .filter(|_| scoring.include_image_text)
                .flatten()
                .map(Violation::signal),
        );
    let outcome = score_violations(signals, &scoring.weights);

    let mut recommendations = text.recommendations;
    recommendations.extend(image.image_recommendations);
    if let Some(analysis) = &image_text {
        recommendations.extend(analysis.recommendations.iter().cloned());
    }
    if let Some(moderation) = &moderation {
        if moderation.findings.safety_score < SAFETY_ADVISORY_BELOW {
            recommendations.push(SAFETY_ADVISORY.to_string());
        }
    }
    if image_text_violations
        .as_ref()
        .is_some_and(|v| !v.is_empty())
    {
        recommendations.push(IMAGE_TEXT_ADVISORY.to_string());
    }

    let summary = build_summary(
        text_violations
            .iter()
            .map(|v| v.severity)
            .chain(image_violations.iter().map(|v| v.violation.severity))
            .chain(
                image_text_violations
                    .iter()
                    .flatten()
                    .map(|v| v.severity),
            ),
    );

    let (scores, safety, has_profanity, profanity_matches, extracted_text) = match moderation {
        Some(m) => (
            Some(m.scores),
            Some(m.findings.safety_score),
            Some(m.has_profanity),
            Some(m.profanity_matches),
            m.extracted_text,
        ),
        None => (None, None, None, None, None),
    };

    ComplianceReport {
        id: fresh_id(),
        timestamp: Utc::now(),
        overall_score: outcome.score,
        status: outcome.status,
        text_violations,
        image_violations,
        image_text_violations,
        platform: context.platform,
        product_category: context.product_category,
        original_text: context.original_text,
        image_url: context.image_url,
        extracted_image_text: extracted_text,
        summary,
        recommendations,
        image_moderation_scores: scores,
        image_safety_score: safety,
        has_profanity,
        profanity_matches,
    }
}

fn build_summary(severities: impl Iterator<Item = Severity>) -> String {
    let mut critical = 0usize;
    let mut warning = 0usize;
    let mut info = 0usize;
    for severity in severities {
        match severity {
            Severity::Critical => critical += 1,
            Severity::Warning => warning += 1,
            Severity::Info => info += 1,
        }
    }
    if critical + warning + info == 0 {
        return ALL_CLEAR_SUMMARY.to_string();
    }

    let mut clauses = Vec::new();
    if critical > 0 {
        clauses.push(format!("{critical} critical issue(s)"));
    }
    if warning > 0 {
        clauses.push(format!("{warning} warning(s)"));
    }
    if info > 0 {
        clauses.push(format!("{info} info item(s)"));
    }
    format!(
        "Analysis found {}. Review the violations below before publishing.",
        clauses.join(", ")
    )
}

/// Format styles supported by the default reporter.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string from a `ComplianceReport` using the desired format.
pub fn render_report(report: &ComplianceReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_human(report: &ComplianceReport) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "Compliance Score: {} ({:?})",
        report.overall_score, report.status
    )?;
    writeln!(
        out,
        "Platform: {} • Category: {}",
        report.platform, report.product_category
    )?;
    writeln!(out)?;
    writeln!(out, "{}", report.summary)?;
    writeln!(out)?;

    render_violations(&mut out, "Text Violations", report.text_violations.iter())?;
    render_violations(
        &mut out,
        "Image Violations",
        report.image_violations.iter().map(|v| &v.violation),
    )?;
    if let Some(image_text) = &report.image_text_violations {
        render_violations(&mut out, "Image Text Violations", image_text.iter())?;
    }

    if let Some(safety) = report.image_safety_score {
        writeln!(out, "Image Safety Score: {safety}")?;
    }
    if report.has_profanity == Some(true) {
        let matches = report
            .profanity_matches
            .as_deref()
            .unwrap_or_default()
            .join(", ");
        writeln!(out, "Profanity detected in image text: {matches}")?;
    }

    if !report.recommendations.is_empty() {
        writeln!(out, "Recommendations:")?;
        for recommendation in &report.recommendations {
            writeln!(out, "  - {recommendation}")?;
        }
    }
    Ok(out)
}

fn render_violations<'a>(
    out: &mut String,
    heading: &str,
    violations: impl Iterator<Item = &'a Violation>,
) -> anyhow::Result<()> {
    let violations: Vec<_> = violations.collect();
    if violations.is_empty() {
        return Ok(());
    }
    writeln!(out, "{heading}:")?;
    for violation in violations {
        let span = match (violation.start_index, violation.end_index) {
            (Some(start), Some(end)) => format!(" @ {start}..{end}"),
            _ => String::new(),
        };
        writeln!(
            out,
            "  - [{severity:?}] {category}{span} ({confidence:.0}%)",
            severity = violation.severity,
            category = violation.category,
            confidence = violation.confidence * 100.0,
        )?;
        if let Some(text) = &violation.offending_text {
            writeln!(out, "    \"{}\"", sanitize_excerpt(text))?;
        }
        writeln!(out, "    {}", violation.policy_description)?;
        writeln!(out, "    Fix: {}", violation.suggested_fix)?;
    }
    writeln!(out)?;
    Ok(())
}

fn sanitize_excerpt(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}
