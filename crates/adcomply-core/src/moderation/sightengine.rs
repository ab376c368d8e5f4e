use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use super::{ModerationOutcome, ModerationScores, NudityScores, OffensiveScores};
use crate::analyzer::ImageSource;
use crate::model::fresh_id;

/// Moderation models requested from the provider per image.
const MODELS: &str =
    "nudity-2.1,recreational_drug,medical,gore-2.0,violence,self-harm,offensive-2.0,genai,text-content";

/// Provider abstraction so the pipeline can run against any moderation
/// backend (or a stub in tests).
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    async fn moderate(&self, image: &ImageSource) -> Result<ModerationOutcome>;
}

/// Environment-driven credentials and tuning for the moderation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationSettings {
    pub api_user: String,
    pub api_secret: String,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl ModerationSettings {
    const USER_ENV: &'static str = "ADCOMPLY_MODERATION_USER";
    const SECRET_ENV: &'static str = "ADCOMPLY_MODERATION_SECRET";
    const ENDPOINT_ENV: &'static str = "ADCOMPLY_MODERATION_ENDPOINT";
    const TIMEOUT_ENV: &'static str = "ADCOMPLY_MODERATION_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "ADCOMPLY_MODERATION_MAX_RETRIES";

    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let required = |key: &'static str| {
            vars.get(key)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| {
                    format!("environment variable {key} must be set when moderation is enabled")
                })
        };
        Ok(Self {
            api_user: required(Self::USER_ENV)?,
            api_secret: required(Self::SECRET_ENV)?,
            endpoint: vars
                .get(Self::ENDPOINT_ENV)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            timeout_secs: vars
                .get(Self::TIMEOUT_ENV)
                .and_then(|v| v.trim().parse::<u64>().ok()),
            max_retries: vars
                .get(Self::RETRIES_ENV)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(1),
        })
    }
}

/// SightEngine `check.json` client: GET for image URLs, multipart POST for
/// uploaded bytes.
#[derive(Debug, Clone)]
pub struct SightEngineClient {
    http: Client,
    url: String,
    api_user: String,
    api_secret: String,
    max_retries: u32,
}

impl SightEngineClient {
    pub fn new(settings: &ModerationSettings) -> Result<Self> {
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.sightengine.com".to_string());
        let url = format!("{}/1.0/check.json", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent("adcomply/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(30)))
            .build()
            .context("failed to build moderation HTTP client")?;
        Ok(Self {
            http,
            url,
            api_user: settings.api_user.clone(),
            api_secret: settings.api_secret.clone(),
            max_retries: settings.max_retries,
        })
    }

    async fn send(&self, image: &ImageSource) -> Result<reqwest::Response> {
        match image {
            ImageSource::Url(image_url) => self
                .http
                .get(&self.url)
                .query(&[
                    ("url", image_url.as_str()),
                    ("models", MODELS),
                    ("api_user", &self.api_user),
                    ("api_secret", &self.api_secret),
                ])
                .send()
                .await
                .context("failed to call moderation API for image URL"),
            ImageSource::Bytes { data, mime } => {
                let extension = mime.split('/').nth(1).unwrap_or("jpg").to_string();
                let part = multipart::Part::bytes(data.clone())
                    .file_name(format!("image.{extension}"))
                    .mime_str(mime)
                    .context("invalid image mime type")?;
                let form = multipart::Form::new()
                    .part("media", part)
                    .text("models", MODELS)
                    .text("api_user", self.api_user.clone())
                    .text("api_secret", self.api_secret.clone());
                self.http
                    .post(&self.url)
                    .multipart(form)
                    .send()
                    .await
                    .context("failed to call moderation API for uploaded image")
            }
        }
    }
}

#[async_trait]
impl ModerationProvider for SightEngineClient {
    async fn moderate(&self, image: &ImageSource) -> Result<ModerationOutcome> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = match self.send(image).await {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    if attempt >= self.max_retries {
                        let status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        bail!("moderation API error ({status}): {body}");
                    }
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                    attempt += 1;
                    continue;
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                    attempt += 1;
                    continue;
                }
            };

            let raw: RawResponse = response
                .json()
                .await
                .context("failed to parse moderation API response")?;
            if raw.status == "failure" {
                let message = raw
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown provider error".into());
                bail!("moderation provider rejected the request: {message}");
            }
            let outcome = parse_outcome(raw);
            debug!(
                request_id = %outcome.request_id,
                has_text = outcome.extracted_text.is_some(),
                "moderation completed"
            );
            return Ok(outcome);
        }
    }
}

/// Map the provider's sparse response into the fixed `ModerationScores`
/// shape, defaulting absent models to zero (nudity `none` to one).
fn parse_outcome(raw: RawResponse) -> ModerationOutcome {
    let nudity = raw.nudity.unwrap_or_default();
    let offensive = raw.offensive.unwrap_or_default();
    let scores = ModerationScores {
        nudity: NudityScores {
            sexual_activity: nudity.sexual_activity,
            sexual_display: nudity.sexual_display,
            erotica: nudity.erotica,
            very_suggestive: nudity.very_suggestive,
            suggestive: nudity.suggestive,
            none: nudity.none,
        },
        recreational_drug: raw.recreational_drug.map(|m| m.prob).unwrap_or(0.0),
        medical: raw.medical.map(|m| m.prob).unwrap_or(0.0),
        gore: raw.gore.map(|m| m.prob).unwrap_or(0.0),
        violence: raw.violence.map(|m| m.prob).unwrap_or(0.0),
        self_harm: raw.self_harm.map(|m| m.prob).unwrap_or(0.0),
        ai_generated: raw.kind.map(|t| t.ai_generated).unwrap_or(0.0),
        offensive: OffensiveScores {
            nazi: offensive.nazi,
            confederate: offensive.confederate,
            supremacist: offensive.supremacist,
            terrorist: offensive.terrorist,
            obscene_gesture: offensive.middle_finger,
        },
    };

    let (extracted_text, profanity_matches) = match raw.text {
        Some(text) => {
            let content = text
                .content
                .filter(|c| !c.trim().is_empty());
            let matches = text
                .profanity
                .into_iter()
                .map(|m| m.matched)
                .collect::<Vec<_>>();
            (content, matches)
        }
        None => (None, Vec::new()),
    };

    ModerationOutcome {
        request_id: raw.request.map(|r| r.id).unwrap_or_else(fresh_id),
        scores,
        has_profanity: !profanity_matches.is_empty(),
        profanity_matches,
        extracted_text,
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    status: String,
    request: Option<RawRequest>,
    nudity: Option<RawNudity>,
    recreational_drug: Option<RawProb>,
    medical: Option<RawProb>,
    gore: Option<RawProb>,
    violence: Option<RawProb>,
    #[serde(rename = "self-harm", alias = "self_harm")]
    self_harm: Option<RawProb>,
    offensive: Option<RawOffensive>,
    // AI-generation probability arrives under `type`, not `genai`.
    #[serde(rename = "type")]
    kind: Option<RawGenAi>,
    text: Option<RawText>,
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawRequest {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawNudity {
    sexual_activity: f32,
    sexual_display: f32,
    erotica: f32,
    very_suggestive: f32,
    suggestive: f32,
    none: f32,
}

#[derive(Deserialize)]
struct RawProb {
    prob: f32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawOffensive {
    nazi: f32,
    confederate: f32,
    supremacist: f32,
    terrorist: f32,
    middle_finger: f32,
}

#[derive(Deserialize)]
struct RawGenAi {
    ai_generated: f32,
}

#[derive(Deserialize)]
struct RawText {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    profanity: Vec<RawProfanity>,
}

#[derive(Deserialize)]
struct RawProfanity {
    #[serde(rename = "match")]
    matched: String,
}

#[derive(Deserialize)]
struct RawError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings(url: String) -> ModerationSettings {
        ModerationSettings {
            api_user: "user".into(),
            api_secret: "secret".into(),
            endpoint: Some(url),
            timeout_secs: Some(5),
            max_retries: 0,
        }
    }

    #[test]
    fn settings_require_credentials() {
        let err = ModerationSettings::from_map(HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("ADCOMPLY_MODERATION_USER"));
    }

    #[test]
    fn parse_defaults_absent_models_to_zero() {
        let raw: RawResponse = serde_json::from_value(json!({
            "status": "success",
            "request": { "id": "req_1" },
            "gore": { "prob": 0.42 }
        }))
        .unwrap();
        let outcome = parse_outcome(raw);
        assert_eq!(outcome.request_id, "req_1");
        assert!((outcome.scores.gore - 0.42).abs() < f32::EPSILON);
        assert_eq!(outcome.scores.violence, 0.0);
        assert_eq!(outcome.scores.nudity.none, 0.0);
        assert!(!outcome.has_profanity);
        assert!(outcome.extracted_text.is_none());
    }

    #[test]
    fn parse_extracts_ocr_text_and_profanity() {
        let raw: RawResponse = serde_json::from_value(json!({
            "status": "success",
            "request": { "id": "req_2" },
            "text": {
                "content": "LOSE 20 POUNDS FAST",
                "profanity": [{ "type": "inappropriate", "match": "damn" }]
            }
        }))
        .unwrap();
        let outcome = parse_outcome(raw);
        assert_eq!(
            outcome.extracted_text.as_deref(),
            Some("LOSE 20 POUNDS FAST")
        );
        assert!(outcome.has_profanity);
        assert_eq!(outcome.profanity_matches, vec!["damn".to_string()]);
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn moderate_url_parses_successful_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/1.0/check.json")
                .query_param("api_user", "user");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "success",
                    "request": { "id": "req_3" },
                    "nudity": {
                        "sexual_activity": 0.01,
                        "sexual_display": 0.01,
                        "erotica": 0.02,
                        "very_suggestive": 0.05,
                        "suggestive": 0.1,
                        "none": 0.9
                    },
                    "violence": { "prob": 0.02 },
                    "type": { "ai_generated": 0.8 }
                }));
        });

        let client = SightEngineClient::new(&settings(server.base_url())).unwrap();
        let outcome = client
            .moderate(&ImageSource::Url("https://cdn.example/ad.jpg".into()))
            .await
            .unwrap();
        assert_eq!(outcome.request_id, "req_3");
        assert!((outcome.scores.ai_generated - 0.8).abs() < f32::EPSILON);
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn provider_failure_status_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/1.0/check.json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "failure",
                    "error": { "message": "quota exceeded", "code": 32 }
                }));
        });

        let client = SightEngineClient::new(&settings(server.base_url())).unwrap();
        let err = client
            .moderate(&ImageSource::Url("https://cdn.example/ad.jpg".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
