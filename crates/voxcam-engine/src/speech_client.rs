use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use voxcam_core::{AudioChunk, AudioEncoding, RecognitionError, RecognitionResult};

/// Confidence assumed when the service omits one, on the 0–1 scale.
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// An empty 44.1 kHz mono WAV, enough to probe a key without sending speech.
const SILENT_WAV_BASE64: &str = "UklGRiQAAABXQVZFZm10IBAAAAABAAEARKwAAIhYAQACABAAZGF0YQAAAAA=";

#[derive(Debug, Serialize)]
pub struct RecognizeRequest {
    pub config: RequestConfig,
    pub audio: RequestAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    pub encoding: &'static str,
    pub language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_automatic_punctuation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channel_count: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct RequestAudio {
    pub content: String,
}

impl RecognizeRequest {
    /// Request for a captured chunk. The sample rate is left for the service
    /// to detect from the container.
    pub fn for_chunk(chunk: &AudioChunk, language_code: &str) -> Self {
        Self {
            config: RequestConfig {
                encoding: chunk.encoding.api_name(),
                language_code: language_code.to_string(),
                enable_automatic_punctuation: Some(true),
                audio_channel_count: Some(1),
            },
            audio: RequestAudio {
                content: STANDARD.encode(&chunk.data),
            },
        }
    }

    fn key_probe(language_code: &str) -> Self {
        Self {
            config: RequestConfig {
                encoding: AudioEncoding::Linear16.api_name(),
                language_code: language_code.to_string(),
                enable_automatic_punctuation: None,
                audio_channel_count: None,
            },
            audio: RequestAudio {
                content: SILENT_WAV_BASE64.to_string(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// The `error` object of a failed call.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Operator-facing explanation of a failed call.
pub fn diagnose(http_status: u16, error: Option<&ApiError>) -> String {
    let Some(error) = error else {
        return format!("unexpected response from the speech service, HTTP {http_status}");
    };
    match error.status.as_str() {
        "INVALID_ARGUMENT" => {
            "API key invalid or malformed: check that the key is correct".to_string()
        }
        "PERMISSION_DENIED" => "Speech-to-Text API is not enabled for this project: enable the \
             Cloud Speech-to-Text API in the Google Cloud console and check that the key has \
             Speech-to-Text permissions"
            .to_string(),
        "UNAUTHENTICATED" => "API key invalid or not authorized: check that the key was created \
             correctly and review its restrictions (domains, IPs)"
            .to_string(),
        other => {
            let message = if error.message.is_empty() {
                "API key invalid or service not enabled"
            } else {
                error.message.as_str()
            };
            format!("{message} (uncatalogued error: {other}, HTTP {http_status})")
        }
    }
}

/// Interpret a recognize response. `Ok(None)` means the call succeeded but
/// nothing was recognized.
pub fn parse_response(
    http_status: u16,
    body: &str,
) -> Result<Option<RecognitionResult>, RecognitionError> {
    let success = (200..300).contains(&http_status);
    let response: RecognizeResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) if !success => {
            return Err(RecognitionError::RemoteService(diagnose(http_status, None)))
        }
        Err(e) => {
            return Err(RecognitionError::RemoteService(format!(
                "unreadable response from the speech service: {e}"
            )))
        }
    };

    if !success || response.error.is_some() {
        return Err(RecognitionError::RemoteService(diagnose(
            http_status,
            response.error.as_ref(),
        )));
    }

    let Some(alternative) = response
        .results
        .first()
        .and_then(|result| result.alternatives.first())
    else {
        return Ok(None);
    };

    let transcript = alternative.transcript.trim();
    if transcript.is_empty() {
        return Ok(None);
    }
    Ok(Some(RecognitionResult {
        transcript: transcript.to_string(),
        confidence: alternative.confidence.unwrap_or(DEFAULT_CONFIDENCE) * 100.0,
    }))
}

/// Remote, one-shot recognition of a finished chunk.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn recognize(
        &self,
        api_key: &str,
        chunk: &AudioChunk,
    ) -> Result<Option<RecognitionResult>, RecognitionError>;
}

/// Google Cloud Speech-to-Text `speech:recognize` over HTTPS, keyed by an API key.
pub struct GoogleSpeechClient {
    http: reqwest::Client,
    endpoint: String,
    language_code: String,
}

impl GoogleSpeechClient {
    pub fn new(endpoint: &str, language_code: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            language_code: language_code.to_string(),
        }
    }

    /// Check that a key can reach the service with Speech-to-Text enabled.
    pub async fn validate_key(&self, api_key: &str) -> Result<(), RecognitionError> {
        if api_key.trim().is_empty() {
            return Err(RecognitionError::RemoteService(
                "no API key provided".to_string(),
            ));
        }
        self.send(api_key, &RecognizeRequest::key_probe(&self.language_code))
            .await
            .map(|_| ())
    }

    async fn send(
        &self,
        api_key: &str,
        request: &RecognizeRequest,
    ) -> Result<Option<RecognitionResult>, RecognitionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                RecognitionError::RemoteService(format!(
                    "speech service request failed: {}",
                    e.without_url()
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RecognitionError::RemoteService(format!(
                "failed to read speech service response: {}",
                e.without_url()
            ))
        })?;
        tracing::trace!(status = status.as_u16(), bytes = body.len(), "speech service replied");

        parse_response(status.as_u16(), &body)
    }
}

#[async_trait]
impl SpeechClient for GoogleSpeechClient {
    async fn recognize(
        &self,
        api_key: &str,
        chunk: &AudioChunk,
    ) -> Result<Option<RecognitionResult>, RecognitionError> {
        tracing::debug!(
            sequence = chunk.sequence,
            encoding = chunk.encoding.api_name(),
            bytes = chunk.data.len(),
            "submitting chunk"
        );
        self.send(api_key, &RecognizeRequest::for_chunk(chunk, &self.language_code))
            .await
    }
}
