use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    str::FromStr,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use adcomply_core::{
    pipeline::{CompliancePipeline, Submission},
    policy::{file_catalog::FilePolicyCatalog, rule_engine::RuleTextAnalyzer},
    AnalyzerSettings, GeminiAnalyzer, ImageSource, ModerationSettings, OutputFormat, Platform,
    PolicyCatalog, ProductCategory, RuleKind, SightEngineClient, Status, TextAnalysis,
    TextAnalyzer,
};

#[derive(Parser, Debug)]
#[command(
    name = "adcomply",
    author,
    version,
    about = "Healthcare ad compliance pre-flight CLI"
)]
struct Cli {
    /// Directory containing the policy catalog (policies.json)
    #[arg(long = "policies-dir", value_name = "DIR", global = true)]
    policies_dir: Option<PathBuf>,

    /// Optional TOML config file with defaults (default: ./adcomply.toml)
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check an ad submission against the policy catalog
    Check {
        /// Marketing copy to check
        #[arg(long, conflicts_with = "text_file")]
        text: Option<String>,
        /// Read marketing copy from a file
        #[arg(long = "text-file", value_name = "FILE")]
        text_file: Option<PathBuf>,
        /// Creative image by URL
        #[arg(long = "image-url", value_name = "URL", conflicts_with = "image_file")]
        image_url: Option<String>,
        /// Creative image from a local file
        #[arg(long = "image-file", value_name = "FILE")]
        image_file: Option<PathBuf>,
        /// Target ad platform: meta, google, or tiktok
        #[arg(long)]
        platform: String,
        /// Product category (predefined slug or custom name)
        #[arg(long)]
        category: String,
        /// Check only the image, skipping copy analysis
        #[arg(long = "image-only")]
        image_only: bool,
        /// Also run the LLM analyzer (requires ADCOMPLY_API_KEY)
        #[arg(long = "with-llm")]
        with_llm: bool,
        /// Also run image moderation (requires ADCOMPLY_MODERATION_* credentials)
        #[arg(long = "with-moderation")]
        with_moderation: bool,
        /// Emit the report as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// List the loaded policy rules
    ListRules {
        /// Only rules applicable to this platform
        #[arg(long)]
        platform: Option<String>,
        /// Only rules applicable to this product category
        #[arg(long)]
        category: Option<String>,
        /// Emit rules as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

/// Defaults read from the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
struct FileDefaults {
    policies_dir: Option<PathBuf>,
}

fn load_defaults(path: Option<&Path>) -> Result<FileDefaults> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from("adcomply.toml"), false),
    };
    let settings = config::Config::builder()
        .add_source(config::File::from(path.clone()).required(required))
        .build()
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    settings
        .try_deserialize()
        .with_context(|| format!("invalid config file {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let defaults = load_defaults(cli.config.as_deref())?;
    let policies_dir = cli
        .policies_dir
        .or(defaults.policies_dir)
        .unwrap_or_else(|| PathBuf::from("./policies"));

    match cli.command.unwrap_or(Commands::ListRules {
        platform: None,
        category: None,
        json: false,
    }) {
        Commands::ListRules {
            platform,
            category,
            json,
        } => {
            list_rules(&policies_dir, platform.as_deref(), category.as_deref(), json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check {
            text,
            text_file,
            image_url,
            image_file,
            platform,
            category,
            image_only,
            with_llm,
            with_moderation,
            json,
        } => {
            let platform = Platform::from_str(&platform).map_err(anyhow::Error::msg)?;
            let product_category = ProductCategory::from(category);

            let marketing_copy = match (text, text_file) {
                (Some(text), None) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) if image_only => String::new(),
                (None, None) => bail!("provide --text or --text-file (or use --image-only)"),
                (Some(_), Some(_)) => unreachable!("clap rejects conflicting flags"),
            };

            let image = match (image_url, image_file) {
                (Some(url), None) => Some(ImageSource::Url(url)),
                (None, Some(path)) => Some(read_image(&path)?),
                (None, None) => None,
                (Some(_), Some(_)) => unreachable!("clap rejects conflicting flags"),
            };
            if image_only && image.is_none() {
                bail!("--image-only requires --image-url or --image-file");
            }

            let pipeline =
                build_pipeline(&policies_dir, with_llm, with_moderation)?;
            let report = pipeline
                .check(&Submission {
                    marketing_copy,
                    platform,
                    product_category,
                    image,
                    image_only,
                })
                .await?;

            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            };
            println!("{}", adcomply_core::render_report(&report, format)?);

            Ok(match report.status {
                Status::Fail => ExitCode::from(1),
                Status::Pass | Status::Review => ExitCode::SUCCESS,
            })
        }
    }
}

fn build_pipeline(
    policies_dir: &Path,
    with_llm: bool,
    with_moderation: bool,
) -> Result<CompliancePipeline> {
    let catalog = Arc::new(FilePolicyCatalog::new(policies_dir));
    let rule_analyzer = Arc::new(RuleTextAnalyzer::new(catalog));

    let mut pipeline = if with_llm {
        let settings = AnalyzerSettings::from_env()?;
        let gemini = Arc::new(GeminiAnalyzer::new(&settings)?);
        let combined = Arc::new(CombinedTextAnalyzer {
            first: rule_analyzer,
            second: Arc::clone(&gemini) as Arc<dyn TextAnalyzer>,
        });
        CompliancePipeline::new(combined).with_image_analyzer(gemini)
    } else {
        CompliancePipeline::new(rule_analyzer)
    };

    if with_moderation {
        let settings = ModerationSettings::from_env()?;
        pipeline = pipeline.with_moderation(Arc::new(SightEngineClient::new(&settings)?));
    }
    Ok(pipeline)
}

/// Runs two analyzers over the same copy and merges their findings. The
/// rule engine is deterministic; the LLM pass supplements it.
struct CombinedTextAnalyzer {
    first: Arc<dyn TextAnalyzer>,
    second: Arc<dyn TextAnalyzer>,
}

#[async_trait]
impl TextAnalyzer for CombinedTextAnalyzer {
    async fn analyze_text(
        &self,
        text: &str,
        platform: Platform,
        category: &ProductCategory,
    ) -> Result<TextAnalysis> {
        let (first, second) = tokio::join!(
            self.first.analyze_text(text, platform, category),
            self.second.analyze_text(text, platform, category),
        );
        let mut merged = first?;
        match second {
            Ok(extra) => {
                merged.violations.extend(extra.violations);
                merged.missing_disclaimers.extend(extra.missing_disclaimers);
                merged.recommendations.extend(extra.recommendations);
            }
            Err(err) => tracing::warn!(%err, "LLM analysis failed; using rule results only"),
        }
        Ok(merged)
    }
}

fn read_image(path: &Path) -> Result<ImageSource> {
    let data =
        fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(ImageSource::Bytes {
        data,
        mime: mime.to_string(),
    })
}

async fn list_rules(
    policies_dir: &Path,
    platform: Option<&str>,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let catalog = FilePolicyCatalog::new(policies_dir);
    let mut rules = catalog.load_rules().await.with_context(|| {
        format!("failed to load policies from {}", policies_dir.display())
    })?;

    if let Some(platform) = platform {
        let platform = Platform::from_str(platform).map_err(anyhow::Error::msg)?;
        rules.retain(|rule| rule.platforms.admits(&platform));
    }
    if let Some(category) = category {
        let category = ProductCategory::from(category.to_string());
        rules.retain(|rule| rule.product_categories.admits(&category));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    println!(
        "{} rule(s) loaded from {}",
        rules.len(),
        policies_dir.display()
    );
    for rule in rules {
        let kind = match rule.kind {
            RuleKind::ProhibitedClaim => "claim",
            RuleKind::RequiredDisclaimer => "disclaimer",
            RuleKind::RestrictedImagery => "imagery",
            RuleKind::PlatformSpecific => "platform",
        };
        println!(
            "- {id:<28} [{kind:10}] {severity:<8} :: {desc}",
            id = rule.id,
            kind = kind,
            severity = format!("{:?}", rule.severity).to_lowercase(),
            desc = rule.description
        );
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
