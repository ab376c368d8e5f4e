use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::{AnalyzerSettings, ImageAnalysis, ImageAnalyzer, ImageSource, TextAnalysis, TextAnalyzer};
use crate::model::{fresh_id, Platform, ProductCategory};
use crate::moderation::ModerationOutcome;

const TEXT_SYSTEM_PROMPT: &str = "You are an expert healthcare advertising compliance analyst. \
Review the marketing copy for policy violations and respond with strict JSON only: \
{\"violations\": [{\"id\", \"severity\": \"critical|warning|info\", \"category\", \
\"offendingText\", \"startIndex\", \"endIndex\", \"policyReference\", \"policyDescription\", \
\"suggestedFix\", \"confidence\": 0.0-1.0}], \"missingDisclaimers\": [same shape without \
offendingText/startIndex/endIndex], \"recommendations\": [\"...\"]}. Quote exact offending \
text with byte offsets. Do not include any summary.";

const IMAGE_SYSTEM_PROMPT: &str = "You are an expert healthcare advertising compliance analyst \
specializing in visual review. Identify before/after comparisons, negative body imagery, \
nudity, misleading imagery, and graphic content. Respond with strict JSON only: \
{\"imageViolations\": [{\"id\", \"severity\": \"critical|warning|info\", \"category\", \
\"imageIssueType\": \"before_after|nudity|negative_body_image|graphic_content|misleading_imagery\", \
\"policyReference\", \"policyDescription\", \"suggestedFix\", \"confidence\": 0.0-1.0, \
\"imageRegion\": {\"x\", \"y\", \"width\", \"height\"} (percentages, optional)}], \
\"imageRecommendations\": [\"...\"]}. Return an empty imageViolations array for compliant images.";

/// LLM analyzer adapter for Gemini-style `generateContent` endpoints.
#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    http: Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiAnalyzer {
    pub fn new(settings: &AnalyzerSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("Gemini API key must be provided via ADCOMPLY_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            model
        );
        let http = Client::builder()
            .user_agent("adcomply/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(30)))
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            max_retries: settings.max_retries,
        })
    }

    async fn generate(&self, parts: Vec<GeminiRequestPart>) -> Result<String> {
        let payload = GeminiRequest {
            contents: vec![GeminiRequestContent {
                role: "user".into(),
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".into(),
                temperature: 0.1,
            },
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = self
                .http
                .post(&self.url)
                .query(&[("key", &self.api_key)])
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err).context("failed to call Gemini generateContent API");
                    }
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                    attempt += 1;
                    continue;
                }
            };

            if !response.status().is_success() {
                if attempt >= self.max_retries {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("Gemini API error ({}): {}", status, body);
                }
                sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(5));
                attempt += 1;
                continue;
            }

            let message: GeminiResponse = response
                .json()
                .await
                .context("failed to parse Gemini response")?;
            return message
                .candidates
                .into_iter()
                .flat_map(|candidate| candidate.content.parts)
                .filter_map(|part| part.text)
                .next()
                .ok_or_else(|| anyhow!("Gemini response missing message content"));
        }
    }

    async fn inline_image(&self, image: &ImageSource) -> Result<GeminiInlineData> {
        match image {
            ImageSource::Bytes { data, mime } => Ok(GeminiInlineData {
                mime_type: mime.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
            ImageSource::Url(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("failed to fetch image from {url}"))?;
                if !response.status().is_success() {
                    bail!("failed to fetch image from {url}: {}", response.status());
                }
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                    .unwrap_or_else(|| "image/jpeg".to_string());
                let bytes = response
                    .bytes()
                    .await
                    .with_context(|| format!("failed to read image bytes from {url}"))?;
                Ok(GeminiInlineData {
                    mime_type: mime,
                    data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                })
            }
        }
    }
}

#[async_trait]
impl TextAnalyzer for GeminiAnalyzer {
    async fn analyze_text(
        &self,
        text: &str,
        platform: Platform,
        category: &ProductCategory,
    ) -> Result<TextAnalysis> {
        let prompt = format!(
            "{TEXT_SYSTEM_PROMPT}\n\nPlatform: {platform}\nProduct category: {category}\n\n\
             Analyze this healthcare marketing copy for compliance violations:\n\n\"\"\"{text}\"\"\"",
        );
        let content = self
            .generate(vec![GeminiRequestPart {
                text: Some(prompt),
                inline_data: None,
            }])
            .await?;

        let mut analysis: TextAnalysis = serde_json::from_str(extract_json(&content))
            .context("expected JSON text analysis from Gemini response")?;
        for violation in analysis
            .violations
            .iter_mut()
            .chain(analysis.missing_disclaimers.iter_mut())
        {
            if violation.id.is_empty() {
                violation.id = fresh_id();
            }
        }
        analysis
            .validate(text)
            .context("Gemini text analysis failed boundary validation")?;
        Ok(analysis)
    }
}

#[async_trait]
impl ImageAnalyzer for GeminiAnalyzer {
    async fn analyze_image(
        &self,
        image: &ImageSource,
        platform: Platform,
        moderation: Option<&ModerationOutcome>,
    ) -> Result<ImageAnalysis> {
        let moderation_context = moderation
            .map(|outcome| {
                format!(
                    "\n\nAutomated moderation pre-scan (probabilities 0-1): {}",
                    serde_json::to_string(&outcome.scores).unwrap_or_default()
                )
            })
            .unwrap_or_default();
        let prompt = format!(
            "{IMAGE_SYSTEM_PROMPT}\n\nPlatform: {platform}{moderation_context}\n\n\
             Analyze this healthcare advertising image for compliance issues.",
        );
        let inline = self.inline_image(image).await?;
        let content = self
            .generate(vec![
                GeminiRequestPart {
                    text: Some(prompt),
                    inline_data: None,
                },
                GeminiRequestPart {
                    text: None,
                    inline_data: Some(inline),
                },
            ])
            .await?;

        let mut analysis: ImageAnalysis = serde_json::from_str(extract_json(&content))
            .context("expected JSON image analysis from Gemini response")?;
        for violation in analysis.image_violations.iter_mut() {
            if violation.violation.id.is_empty() {
                violation.violation.id = fresh_id();
            }
        }
        analysis
            .validate()
            .context("Gemini image analysis failed boundary validation")?;
        Ok(analysis)
    }
}

/// Strip markdown fences some models wrap around their JSON output.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if end >= start => &unfenced[start..=end],
        _ => unfenced,
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiRequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GeminiRequestContent {
    role: String,
    parts: Vec<GeminiRequestPart>,
}

#[derive(Serialize)]
struct GeminiRequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Serialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_settings(url: String) -> AnalyzerSettings {
        AnalyzerSettings {
            provider: "gemini".into(),
            api_key: "test-key".into(),
            endpoint: Some(url),
            model: Some("gemini-test".into()),
            timeout_secs: Some(5),
            max_retries: 0,
        }
    }

    #[test]
    fn extract_json_handles_fences_and_prose() {
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Here you go: {\"a\":1} done"), "{\"a\":1}");
    }

    #[test]
    fn missing_key_is_rejected_up_front() {
        let mut settings = base_settings("http://localhost".into());
        settings.api_key = "  ".into();
        assert!(GeminiAnalyzer::new(&settings).is_err());
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn analyze_text_parses_and_backfills_ids() {
        let server = MockServer::start();
        let verdict = json!({
            "violations": [{
                "severity": "critical",
                "category": "Misleading Claims",
                "offendingText": "cure",
                "startIndex": 21,
                "endIndex": 25,
                "policyReference": "Policy 1.1",
                "policyDescription": "claims a cure",
                "suggestedFix": "say 'may support'",
                "confidence": 0.95
            }],
            "missingDisclaimers": [],
            "recommendations": ["Tone down outcome language"]
        })
        .to_string();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent")
                .query_param("key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [{
                        "content": { "role": "model", "parts": [{ "text": verdict }] }
                    }]
                }));
        });

        let analyzer = GeminiAnalyzer::new(&base_settings(server.base_url())).unwrap();
        let analysis = analyzer
            .analyze_text(
                "This supplement is a cure.",
                Platform::Meta,
                &ProductCategory::Supplements,
            )
            .await
            .unwrap();
        assert_eq!(analysis.violations.len(), 1);
        assert!(!analysis.violations[0].id.is_empty());
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn malformed_confidence_is_rejected_at_boundary() {
        let server = MockServer::start();
        let verdict = json!({
            "violations": [{
                "severity": "warning",
                "category": "Misleading Claims",
                "policyReference": "Policy 1.1",
                "policyDescription": "overclaims",
                "suggestedFix": "soften",
                "confidence": 1.8
            }],
            "missingDisclaimers": [],
            "recommendations": []
        })
        .to_string();
        server.mock(|when, then| {
            when.method(POST).path("/v1beta/models/gemini-test:generateContent");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [{
                        "content": { "role": "model", "parts": [{ "text": verdict }] }
                    }]
                }));
        });

        let analyzer = GeminiAnalyzer::new(&base_settings(server.base_url())).unwrap();
        let err = analyzer
            .analyze_text("copy", Platform::Meta, &ProductCategory::Skincare)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boundary validation"));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn retries_on_server_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1beta/models/gemini-test:generateContent");
            then.status(500);
        });

        let mut settings = base_settings(server.base_url());
        settings.max_retries = 1;
        let analyzer = GeminiAnalyzer::new(&settings).unwrap();
        let err = analyzer
            .analyze_text("copy", Platform::Meta, &ProductCategory::Skincare)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Gemini API error"));
        mock.assert_hits(2);
    }
}
