//! HTTP client for the media conversion endpoints.

use std::path::{Path, PathBuf};

use kindred_sync::error::{PayloadSnafu, ReadMediaSnafu, RequestSnafu, StatusSnafu};
use kindred_sync::{
    BoxFuture, MediaService, ServiceError, ServiceResult, SpeechRequest, Transcript,
    TranscriptionRequest,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use url::Url;

const IMAGE_UPLOAD_ROUTE: &str = "media/images";
const TRANSCRIPTION_ROUTE: &str = "speech/transcriptions";
const SYNTHESIS_ROUTE: &str = "speech/synthesis";

const UPLOAD_SERVICE: &str = "image-upload";
const TRANSCRIPTION_SERVICE: &str = "speech-to-text";
const SYNTHESIS_SERVICE: &str = "text-to-speech";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionResponse {
    transcript: String,
    audio_url: String,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisResponse {
    audio_url: String,
}

/// [`MediaService`] backed by the companion HTTP API under one base URL.
#[derive(Debug, Clone)]
pub struct HttpMediaService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpMediaService {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // Relative joins replace the last path segment unless the base ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    fn route(&self, stage: &'static str, service: &'static str, route: &str) -> ServiceResult<Url> {
        self.base_url.join(route).map_err(|error| {
            RequestSnafu {
                stage,
                service,
                message: error.to_string(),
            }
            .build()
        })
    }

    async fn upload(&self, file: &Path) -> ServiceResult<String> {
        let stage = "upload-image";
        let url = self.route(stage, UPLOAD_SERVICE, IMAGE_UPLOAD_ROUTE)?;
        let form = Form::new().part("file", file_part(stage, UPLOAD_SERVICE, file).await?);

        let response = self.client.post(url).multipart(form).send().await;
        let body: UploadResponse = read_json(stage, UPLOAD_SERVICE, response).await?;
        ensure!(
            !body.url.trim().is_empty(),
            PayloadSnafu {
                stage,
                service: UPLOAD_SERVICE,
                details: "missing url",
            }
        );

        tracing::debug!(file = %file.display(), url = %body.url, "uploaded image");
        Ok(body.url)
    }

    async fn speech_to_text(&self, request: TranscriptionRequest) -> ServiceResult<Transcript> {
        let stage = "transcribe";
        let url = self.route(stage, TRANSCRIPTION_SERVICE, TRANSCRIPTION_ROUTE)?;
        let form = Form::new()
            .part(
                "file",
                file_part(stage, TRANSCRIPTION_SERVICE, &request.recording).await?,
            )
            .text("language", request.language)
            .text("userId", request.user_id.to_string())
            .text("conversationId", request.conversation_id.to_string())
            .text("messageId", request.message_id.to_string());

        let response = self.client.post(url).multipart(form).send().await;
        let body: TranscriptionResponse =
            read_json(stage, TRANSCRIPTION_SERVICE, response).await?;
        ensure!(
            !body.audio_url.trim().is_empty(),
            PayloadSnafu {
                stage,
                service: TRANSCRIPTION_SERVICE,
                details: "missing audioUrl",
            }
        );

        Ok(Transcript {
            text: body.transcript,
            audio_url: body.audio_url,
            duration_secs: body.duration,
        })
    }

    async fn text_to_speech(&self, request: SpeechRequest) -> ServiceResult<String> {
        let stage = "synthesize";
        let url = self.route(stage, SYNTHESIS_SERVICE, SYNTHESIS_ROUTE)?;
        let payload = serde_json::json!({
            "text": request.text,
            "voice": request.voice,
            "language": request.language,
        });

        let response = self.client.post(url).json(&payload).send().await;
        let body: SynthesisResponse = read_json(stage, SYNTHESIS_SERVICE, response).await?;
        ensure!(
            !body.audio_url.trim().is_empty(),
            PayloadSnafu {
                stage,
                service: SYNTHESIS_SERVICE,
                details: "missing audioUrl",
            }
        );
        Ok(body.audio_url)
    }
}

impl MediaService for HttpMediaService {
    fn upload_image(&self, file: PathBuf) -> BoxFuture<'_, ServiceResult<String>> {
        Box::pin(async move { self.upload(&file).await })
    }

    fn transcribe(&self, request: TranscriptionRequest) -> BoxFuture<'_, ServiceResult<Transcript>> {
        Box::pin(self.speech_to_text(request))
    }

    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<'_, ServiceResult<String>> {
        Box::pin(self.text_to_speech(request))
    }
}

async fn file_part(stage: &'static str, service: &'static str, path: &Path) -> ServiceResult<Part> {
    let bytes = tokio::fs::read(path).await.context(ReadMediaSnafu { stage, path })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime_for(path))
        .map_err(|error| request_error(stage, service, &error))
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg" | "oga") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

fn request_error(
    stage: &'static str,
    service: &'static str,
    error: &reqwest::Error,
) -> ServiceError {
    RequestSnafu {
        stage,
        service,
        message: error.to_string(),
    }
    .build()
}

async fn read_json<T: DeserializeOwned>(
    stage: &'static str,
    service: &'static str,
    response: reqwest::Result<reqwest::Response>,
) -> ServiceResult<T> {
    let response = response.map_err(|error| request_error(stage, service, &error))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| request_error(stage, service, &error))?;

    if !status.is_success() {
        tracing::warn!(service, status = status.as_u16(), "media request rejected");
        return StatusSnafu {
            stage,
            service,
            status: status.as_u16(),
            body,
        }
        .fail();
    }
    parse_body(stage, service, &body)
}

fn parse_body<T: DeserializeOwned>(
    stage: &'static str,
    service: &'static str,
    body: &str,
) -> ServiceResult<T> {
    serde_json::from_str(body).map_err(|error| {
        PayloadSnafu {
            stage,
            service,
            details: error.to_string(),
        }
        .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpMediaService {
        HttpMediaService::new(Url::parse(base).unwrap())
    }

    #[test]
    fn routes_join_under_base_path() {
        let service = service("https://api.example/v1");

        let url = service
            .route("test", UPLOAD_SERVICE, IMAGE_UPLOAD_ROUTE)
            .unwrap();

        assert_eq!(url.as_str(), "https://api.example/v1/media/images");
    }

    #[test]
    fn parses_transcription_payload() {
        let body = r#"{"transcript":"hi there","audioUrl":"https://cdn/a.m4a","duration":2.5}"#;

        let parsed: TranscriptionResponse = parse_body("test", TRANSCRIPTION_SERVICE, body).unwrap();

        assert_eq!(parsed.transcript, "hi there");
        assert_eq!(parsed.audio_url, "https://cdn/a.m4a");
        assert_eq!(parsed.duration, Some(2.5));
    }

    #[test]
    fn malformed_payload_is_a_payload_error() {
        let result = parse_body::<UploadResponse>("test", UPLOAD_SERVICE, "{\"link\":1}");

        assert!(matches!(result, Err(ServiceError::Payload { .. })));
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(mime_for(Path::new("/tmp/a.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("/tmp/voice.m4a")), "audio/mp4");
        assert_eq!(mime_for(Path::new("/tmp/blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_fails_before_any_request() {
        let result = service("http://127.0.0.1:9")
            .upload_image("/definitely/not/here.png".into())
            .await;

        assert!(matches!(result, Err(ServiceError::ReadMedia { .. })));
    }
}
