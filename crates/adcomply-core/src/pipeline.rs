use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::analyzer::{ImageAnalysis, ImageAnalyzer, ImageSource, TextAnalysis, TextAnalyzer};
use crate::model::{Platform, ProductCategory};
use crate::moderation::{ModerationOutcome, ModerationProvider, Translator};
use crate::report::{assemble, ComplianceReport, ModerationInput, ReportContext};
use crate::scoring::ScoringConfig;

/// OCR fragments shorter than this are noise, not analyzable copy.
const MIN_OCR_TEXT_LEN: usize = 10;

/// One ad submission to pre-flight.
#[derive(Debug, Clone)]
pub struct Submission {
    pub marketing_copy: String,
    pub platform: Platform,
    pub product_category: ProductCategory,
    pub image: Option<ImageSource>,
    /// Skip copy analysis and check only the creative image.
    pub image_only: bool,
}

/// Orchestrates the analyzers around the pure core: runs modalities
/// concurrently, degrades failed ones to empty results, and hands
/// everything to the report assembler.
pub struct CompliancePipeline {
    text_analyzer: Arc<dyn TextAnalyzer>,
    image_analyzer: Option<Arc<dyn ImageAnalyzer>>,
    moderation: Option<Arc<dyn ModerationProvider>>,
    translator: Translator,
    scoring: ScoringConfig,
}

impl CompliancePipeline {
    pub fn new(text_analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self {
            text_analyzer,
            image_analyzer: None,
            moderation: None,
            translator: Translator::default(),
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_image_analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.image_analyzer = Some(analyzer);
        self
    }

    pub fn with_moderation(mut self, provider: Arc<dyn ModerationProvider>) -> Self {
        self.moderation = Some(provider);
        self
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Run a submission end to end. Fails only on invalid input (bad custom
    /// category, misconfigured weights); analyzer failures degrade to empty
    /// modalities so one broken upstream never blocks the report.
    #[instrument(name = "compliance_check", skip(self, submission), fields(platform = %submission.platform))]
    pub async fn check(&self, submission: &Submission) -> Result<ComplianceReport> {
        if let ProductCategory::Custom(name) = &submission.product_category {
            ProductCategory::validate_custom(name)
                .context("invalid custom product category")?;
        }
        self.scoring
            .weights
            .validate()
            .context("invalid scoring configuration")?;

        let moderation = self.run_moderation(submission).await;
        let ocr_text = moderation
            .as_ref()
            .and_then(|outcome| outcome.extracted_text.clone())
            .filter(|text| text.trim().len() > MIN_OCR_TEXT_LEN);

        let text_fut = self.run_text(submission);
        let image_fut = self.run_image(submission, moderation.as_ref());
        let ocr_fut = self.run_image_text(submission, ocr_text.as_deref());
        let (text, image, image_text) = tokio::join!(text_fut, image_fut, ocr_fut);

        let moderation_input = moderation.and_then(|outcome| {
            match self.translator.translate(&outcome.scores) {
                Ok(findings) => Some(ModerationInput {
                    scores: outcome.scores,
                    findings,
                    extracted_text: outcome.extracted_text,
                    has_profanity: outcome.has_profanity,
                    profanity_matches: outcome.profanity_matches,
                }),
                Err(err) => {
                    warn!(%err, "moderation score translation failed; skipping modality");
                    None
                }
            }
        });

        let context = ReportContext {
            original_text: submission.marketing_copy.clone(),
            platform: submission.platform,
            product_category: submission.product_category.clone(),
            image_url: submission.image.as_ref().and_then(|i| i.url().map(String::from)),
        };
        let report = assemble(context, text, image, moderation_input, image_text, &self.scoring);
        debug!(score = report.overall_score, status = ?report.status, "report assembled");
        Ok(report)
    }

    async fn run_moderation(&self, submission: &Submission) -> Option<ModerationOutcome> {
        let provider = self.moderation.as_ref()?;
        let image = submission.image.as_ref()?;
        match provider.moderate(image).await {
            Ok(outcome) => {
                // Malformed provider scores are a failed modality, not a
                // corrupted report.
                if let Err(err) = outcome.scores.validate() {
                    warn!(%err, "moderation provider returned malformed scores; skipping modality");
                    return None;
                }
                Some(outcome)
            }
            Err(err) => {
                warn!(%err, "image moderation failed; continuing without it");
                None
            }
        }
    }

    async fn run_text(&self, submission: &Submission) -> TextAnalysis {
        if submission.image_only {
            return TextAnalysis::empty();
        }
        match self
            .text_analyzer
            .analyze_text(
                &submission.marketing_copy,
                submission.platform,
                &submission.product_category,
            )
            .await
        {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(%err, "text analysis failed; continuing with empty result");
                TextAnalysis::empty()
            }
        }
    }

    async fn run_image(
        &self,
        submission: &Submission,
        moderation: Option<&ModerationOutcome>,
    ) -> Option<ImageAnalysis> {
        let analyzer = self.image_analyzer.as_ref()?;
        let image = submission.image.as_ref()?;
        match analyzer
            .analyze_image(image, submission.platform, moderation)
            .await
        {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                warn!(%err, "image analysis failed; continuing with empty result");
                Some(ImageAnalysis::empty())
            }
        }
    }

    async fn run_image_text(
        &self,
        submission: &Submission,
        ocr_text: Option<&str>,
    ) -> Option<TextAnalysis> {
        let text = ocr_text?;
        match self
            .text_analyzer
            .analyze_text(text, submission.platform, &submission.product_category)
            .await
        {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                warn!(%err, "image-text analysis failed; continuing without it");
                None
            }
        }
    }
}
