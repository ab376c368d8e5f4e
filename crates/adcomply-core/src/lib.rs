pub mod analyzer;
pub mod model;
pub mod moderation;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod scoring;

pub use analyzer::{
    gemini::GeminiAnalyzer, AnalyzerSettings, ImageAnalysis, ImageAnalyzer, ImageSource,
    TextAnalysis, TextAnalyzer,
};
pub use model::{
    CategoryError, ImageIssueType, ImageRegion, ImageViolation, Platform, ProductCategory,
    Severity, Violation, ViolationValidationError,
};
pub use moderation::{
    ModerationFindings, ModerationOutcome, ModerationProvider, ModerationScores,
    ModerationSettings, ModerationThresholds, SightEngineClient, Translator,
};
pub use pipeline::{CompliancePipeline, Submission};
pub use policy::{
    file_catalog::FilePolicyCatalog, rule_engine::RuleTextAnalyzer, select_rules, Applicability,
    PolicyCatalog, PolicyRule, RuleKind, RuleValidationError,
};
pub use report::{render_report, ComplianceReport, OutputFormat, ReportContext};
pub use scoring::{score_violations, ScoreOutcome, ScoringConfig, SeverityWeights, Status};
