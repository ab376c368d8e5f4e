use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{fresh_id, ImageIssueType, ImageViolation, Severity, Violation};

pub mod sightengine;

pub use sightengine::{ModerationProvider, ModerationSettings, SightEngineClient};

/// Nudity sub-scores reported by the moderation provider, each in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudityScores {
    pub sexual_activity: f32,
    pub sexual_display: f32,
    pub erotica: f32,
    pub very_suggestive: f32,
    pub suggestive: f32,
    pub none: f32,
}

impl Default for NudityScores {
    fn default() -> Self {
        Self {
            sexual_activity: 0.0,
            sexual_display: 0.0,
            erotica: 0.0,
            very_suggestive: 0.0,
            suggestive: 0.0,
            none: 1.0,
        }
    }
}

/// Offensive-content sub-scores. The translator synthesizes one violation
/// from the maximum across these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OffensiveScores {
    pub nazi: f32,
    pub confederate: f32,
    pub supremacist: f32,
    pub terrorist: f32,
    pub obscene_gesture: f32,
}

impl OffensiveScores {
    pub fn max(&self) -> f32 {
        [
            self.nazi,
            self.confederate,
            self.supremacist,
            self.terrorist,
            self.obscene_gesture,
        ]
        .into_iter()
        .fold(0.0, f32::max)
    }

    fn labeled(&self) -> [(&'static str, f32); 5] {
        [
            ("nazi symbolism", self.nazi),
            ("confederate imagery", self.confederate),
            ("supremacist content", self.supremacist),
            ("terrorist content", self.terrorist),
            ("obscene gestures", self.obscene_gesture),
        ]
    }
}

/// Category-level probability scores for one image. Immutable once received
/// from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationScores {
    pub nudity: NudityScores,
    pub recreational_drug: f32,
    pub medical: f32,
    pub gore: f32,
    pub violence: f32,
    pub self_harm: f32,
    pub ai_generated: f32,
    pub offensive: OffensiveScores,
}

impl ModerationScores {
    /// Reject out-of-range probabilities at the provider boundary rather
    /// than letting them corrupt the safety score.
    pub fn validate(&self) -> Result<(), ScoreValidationError> {
        let fields = [
            ("nudity.sexual_activity", self.nudity.sexual_activity),
            ("nudity.sexual_display", self.nudity.sexual_display),
            ("nudity.erotica", self.nudity.erotica),
            ("nudity.very_suggestive", self.nudity.very_suggestive),
            ("nudity.suggestive", self.nudity.suggestive),
            ("nudity.none", self.nudity.none),
            ("recreational_drug", self.recreational_drug),
            ("medical", self.medical),
            ("gore", self.gore),
            ("violence", self.violence),
            ("self_harm", self.self_harm),
            ("ai_generated", self.ai_generated),
            ("offensive.nazi", self.offensive.nazi),
            ("offensive.confederate", self.offensive.confederate),
            ("offensive.supremacist", self.offensive.supremacist),
            ("offensive.terrorist", self.offensive.terrorist),
            ("offensive.obscene_gesture", self.offensive.obscene_gesture),
        ];
        for (field, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScoreValidationError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// Validation errors for provider-supplied probability scores.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum ScoreValidationError {
    #[error("moderation score `{field}` must be within 0.0..=1.0 (got {value})")]
    OutOfRange { field: &'static str, value: f32 },
}

/// Everything one moderation call yields: scores plus optional OCR output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationOutcome {
    pub request_id: String,
    pub scores: ModerationScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub has_profanity: bool,
    #[serde(default)]
    pub profanity_matches: Vec<String>,
}

/// Critical/warning probability threshold pair for one category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub critical: f32,
    pub warning: f32,
}

const fn pair(critical: f32, warning: f32) -> ThresholdPair {
    ThresholdPair { critical, warning }
}

/// Per-category thresholds for violation synthesis. Defaults follow the
/// shipped policy; every value is tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationThresholds {
    pub sexual_activity: ThresholdPair,
    pub sexual_display: ThresholdPair,
    pub erotica: ThresholdPair,
    pub very_suggestive: ThresholdPair,
    pub suggestive: ThresholdPair,
    pub recreational_drug: ThresholdPair,
    pub gore: ThresholdPair,
    pub violence: ThresholdPair,
    pub self_harm: ThresholdPair,
    pub offensive: ThresholdPair,
    /// AI-generation has a single warning-only tier.
    pub ai_generated_warning: f32,
    /// Offensive sub-types above this are named in the violation text.
    pub offensive_disclosure: f32,
}

impl Default for ModerationThresholds {
    fn default() -> Self {
        Self {
            sexual_activity: pair(0.50, 0.30),
            sexual_display: pair(0.50, 0.30),
            erotica: pair(0.40, 0.20),
            very_suggestive: pair(0.60, 0.40),
            suggestive: pair(0.70, 0.50),
            recreational_drug: pair(0.50, 0.30),
            gore: pair(0.30, 0.10),
            violence: pair(0.50, 0.30),
            self_harm: pair(0.30, 0.10),
            offensive: pair(0.50, 0.30),
            ai_generated_warning: 0.70,
            offensive_disclosure: 0.30,
        }
    }
}

/// Per-category weights for the safety-score penalty sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyWeights {
    pub nudity: f32,
    pub drugs: f32,
    pub gore: f32,
    pub violence: f32,
    pub self_harm: f32,
    pub offensive: f32,
    pub ai: f32,
}

impl Default for SafetyWeights {
    fn default() -> Self {
        Self {
            nudity: 0.25,
            drugs: 0.15,
            gore: 0.20,
            violence: 0.15,
            self_harm: 0.20,
            offensive: 0.15,
            ai: 0.10,
        }
    }
}

/// Three-tier safety-score policy: hard ceiling, capped warning band,
/// uncapped weighted penalty. The tier structure is the contract; the
/// numbers are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyScoreConfig {
    pub weights: SafetyWeights,
    /// Any single category at or above this forces the 0..=ceiling_max band.
    pub hard_ceiling: f32,
    /// Top of the score range once the ceiling triggers.
    pub ceiling_max: f32,
    /// Max-category level that caps the weighted score at `band_cap`.
    pub warning_band: f32,
    pub band_cap: f32,
    /// Multiplier applied to the weighted penalty sum.
    pub penalty_multiplier: f32,
    /// Discount for the suggestive-only nudity channel.
    pub suggestive_discount: f32,
    /// Extra dampening on the AI-generation penalty contribution.
    pub ai_dampening: f32,
}

impl Default for SafetyScoreConfig {
    fn default() -> Self {
        Self {
            weights: SafetyWeights::default(),
            hard_ceiling: 0.65,
            ceiling_max: 20.0,
            warning_band: 0.40,
            band_cap: 60.0,
            penalty_multiplier: 1.5,
            suggestive_discount: 0.7,
            ai_dampening: 0.3,
        }
    }
}

/// Violations synthesized from one set of moderation scores, plus the
/// derived 0–100 safety score (higher is safer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationFindings {
    pub violations: Vec<ImageViolation>,
    pub safety_score: u8,
}

/// Deterministic mapping from category probability scores to synthesized
/// violations and a safety score.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    pub thresholds: ModerationThresholds,
    pub safety: SafetyScoreConfig,
}

impl Translator {
    pub fn new(thresholds: ModerationThresholds, safety: SafetyScoreConfig) -> Self {
        Self { thresholds, safety }
    }

    /// Translate validated scores into violations and a safety score.
    pub fn translate(
        &self,
        scores: &ModerationScores,
    ) -> Result<ModerationFindings, ScoreValidationError> {
        scores.validate()?;
        Ok(ModerationFindings {
            violations: self.synthesize_violations(scores),
            safety_score: self.safety_score(scores),
        })
    }

    fn synthesize_violations(&self, scores: &ModerationScores) -> Vec<ImageViolation> {
        let mut violations = Vec::new();
        let t = &self.thresholds;

        let nudity_checks = [
            ("Sexual Activity", scores.nudity.sexual_activity, t.sexual_activity),
            ("Sexual Display", scores.nudity.sexual_display, t.sexual_display),
            ("Erotica", scores.nudity.erotica, t.erotica),
            (
                "Very Suggestive Content",
                scores.nudity.very_suggestive,
                t.very_suggestive,
            ),
            ("Suggestive Content", scores.nudity.suggestive, t.suggestive),
        ];
        for (label, score, thresholds) in nudity_checks {
            if let Some(severity) = tier(score, thresholds) {
                violations.push(nudity_violation(label, score, severity));
            }
        }

        if let Some(severity) = tier(scores.recreational_drug, t.recreational_drug) {
            violations.push(drug_violation(scores.recreational_drug, severity));
        }
        if let Some(severity) = tier(scores.gore, t.gore) {
            violations.push(gore_violation(scores.gore, severity));
        }
        if let Some(severity) = tier(scores.violence, t.violence) {
            violations.push(violence_violation(scores.violence, severity));
        }
        if let Some(severity) = tier(scores.self_harm, t.self_harm) {
            violations.push(self_harm_violation(scores.self_harm, severity));
        }

        let offensive_max = scores.offensive.max();
        if let Some(severity) = tier(offensive_max, t.offensive) {
            let flagged: Vec<&str> = scores
                .offensive
                .labeled()
                .into_iter()
                .filter(|(_, score)| *score >= t.offensive_disclosure)
                .map(|(label, _)| label)
                .collect();
            violations.push(offensive_violation(offensive_max, severity, &flagged));
        }

        // AI-generation is disclosure-grade only, never blocking.
        if scores.ai_generated >= t.ai_generated_warning {
            violations.push(ai_generated_violation(scores.ai_generated));
        }

        violations
    }

    /// Safety score, 0–100, higher is safer. One category crossing the hard
    /// ceiling is disqualifying on its own; averaging must not dilute it.
    pub fn safety_score(&self, scores: &ModerationScores) -> u8 {
        let cfg = &self.safety;
        let max_nudity = [
            scores.nudity.sexual_activity,
            scores.nudity.sexual_display,
            scores.nudity.erotica,
            scores.nudity.very_suggestive,
            scores.nudity.suggestive * cfg.suggestive_discount,
        ]
        .into_iter()
        .fold(0.0, f32::max);

        let offensive_max = scores.offensive.max();
        let max_risk = [
            max_nudity,
            scores.gore,
            scores.self_harm,
            scores.recreational_drug,
            scores.violence,
            offensive_max,
        ]
        .into_iter()
        .fold(0.0, f32::max);

        if max_risk >= cfg.hard_ceiling {
            let span = (1.0 - cfg.hard_ceiling).max(f32::EPSILON);
            let ramp = cfg.ceiling_max * (1.0 - (max_risk - cfg.hard_ceiling) / span);
            return ramp.round().clamp(0.0, cfg.ceiling_max) as u8;
        }

        let w = &cfg.weights;
        let penalty = max_nudity * w.nudity
            + scores.recreational_drug * w.drugs
            + scores.gore * w.gore
            + scores.violence * w.violence
            + scores.self_harm * w.self_harm
            + offensive_max * w.offensive
            + scores.ai_generated * w.ai * cfg.ai_dampening;
        let base = (100.0 * (1.0 - penalty * cfg.penalty_multiplier)).clamp(0.0, 100.0);

        let score = if max_risk >= cfg.warning_band {
            base.min(cfg.band_cap)
        } else {
            base
        };
        score.round() as u8
    }
}

fn tier(score: f32, thresholds: ThresholdPair) -> Option<Severity> {
    if score >= thresholds.critical {
        Some(Severity::Critical)
    } else if score >= thresholds.warning {
        Some(Severity::Warning)
    } else {
        None
    }
}

fn pct(score: f32) -> i32 {
    (score * 100.0).round() as i32
}

fn image_violation(
    severity: Severity,
    category: &str,
    policy_reference: &str,
    policy_description: String,
    suggested_fix: &str,
    confidence: f32,
    issue_type: ImageIssueType,
) -> ImageViolation {
    ImageViolation {
        violation: Violation {
            id: fresh_id(),
            severity,
            category: category.into(),
            offending_text: None,
            start_index: None,
            end_index: None,
            policy_reference: policy_reference.into(),
            policy_description,
            suggested_fix: suggested_fix.into(),
            confidence,
        },
        image_issue_type: issue_type,
        image_region: None,
        source_url: None,
    }
}

fn nudity_violation(label: &str, score: f32, severity: Severity) -> ImageViolation {
    image_violation(
        severity,
        "Inappropriate Content",
        "Policy 3.1 – Prohibited Nudity/Sexual Content",
        format!(
            "Image contains {} ({}% confidence). This violates platform advertising \
             policies that prohibit sexually suggestive or explicit content.",
            label.to_lowercase(),
            pct(score)
        ),
        "Replace the image with appropriate, non-suggestive content that focuses on \
         the product benefits without sexual undertones.",
        score,
        ImageIssueType::Nudity,
    )
}

fn drug_violation(score: f32, severity: Severity) -> ImageViolation {
    image_violation(
        severity,
        "Drug-Related Content",
        "Policy 4.5 – Recreational Drug Imagery",
        format!(
            "Image may contain recreational drug-related content ({}% confidence). \
             This is prohibited on all major advertising platforms.",
            pct(score)
        ),
        "Remove any drug paraphernalia or substances from the image. Use clean, \
         professional imagery that focuses on legitimate health benefits.",
        score,
        ImageIssueType::GraphicContent,
    )
}

fn gore_violation(score: f32, severity: Severity) -> ImageViolation {
    image_violation(
        severity,
        "Graphic Content",
        "Policy 3.4 – Gore/Graphic Imagery",
        format!(
            "Image contains graphic or gory content ({}% confidence). This violates \
             platform policies against shocking or disturbing imagery.",
            pct(score)
        ),
        "Replace with non-graphic imagery. For medical products, use illustrations \
         or diagrams instead of realistic graphic imagery.",
        score,
        ImageIssueType::GraphicContent,
    )
}

fn violence_violation(score: f32, severity: Severity) -> ImageViolation {
    image_violation(
        severity,
        "Violent Content",
        "Policy 3.3 – Violence Depiction",
        format!(
            "Image may contain violent content ({}% confidence). Violent imagery is \
             prohibited in advertising.",
            pct(score)
        ),
        "Remove violent elements from the image. Focus on positive, constructive \
         messaging and imagery.",
        score,
        ImageIssueType::GraphicContent,
    )
}

fn self_harm_violation(score: f32, severity: Severity) -> ImageViolation {
    image_violation(
        severity,
        "Self-Harm Content",
        "Policy 3.5 – Self-Harm Imagery",
        format!(
            "Image may contain self-harm related content ({}% confidence). This \
             content is strictly prohibited.",
            pct(score)
        ),
        "Replace with imagery that promotes positive health outcomes. Consider \
         using supportive, recovery-focused visuals.",
        score,
        ImageIssueType::GraphicContent,
    )
}

fn offensive_violation(score: f32, severity: Severity, flagged: &[&str]) -> ImageViolation {
    let detail = if flagged.is_empty() {
        String::new()
    } else {
        format!(" Detected sub-types: {}.", flagged.join(", "))
    };
    image_violation(
        severity,
        "Offensive Content",
        "Policy 3.6 – Offensive Symbols and Gestures",
        format!(
            "Image may contain offensive content ({}% confidence).{detail} Hate \
             symbols and obscene gestures are prohibited in advertising.",
            pct(score)
        ),
        "Remove the offensive element entirely. There is no compliant way to \
         include hate symbols or obscene gestures in ad creative.",
        score,
        ImageIssueType::GraphicContent,
    )
}

fn ai_generated_violation(score: f32) -> ImageViolation {
    image_violation(
        Severity::Info,
        "AI-Generated Content",
        "Policy 5.1 – AI-Generated Imagery Disclosure",
        format!(
            "Image appears to be AI-generated ({}% confidence). Some platforms \
             require disclosure of AI-generated content.",
            pct(score)
        ),
        "Consider adding a disclosure that the image is AI-generated, or use \
         authentic photography where appropriate.",
        score,
        ImageIssueType::MisleadingImagery,
    )
}
