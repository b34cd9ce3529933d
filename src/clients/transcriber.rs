//! 语音转写协作方
//!
//! 音频字节 → 文字稿。默认实现调用 Whisper 风格的转写 HTTP API。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{CollaboratorError, EvalError, EvalResult};

/// 语音转写协作方接口
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// 把录音转写为文字稿
    async fn transcribe(&self, audio: &[u8], filename: &str) -> EvalResult<String>;
}

/// Whisper 风格转写 API 的默认实现
pub struct WhisperTranscriber {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.transcribe_api_base_url.clone(),
            api_key: config.transcribe_api_key.clone(),
            model_name: config.transcribe_model_name.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], filename: &str) -> EvalResult<String> {
        let endpoint = format!("{}/audio/transcriptions", self.base_url);
        debug!("转写音频: {} ({} 字节)", filename, audio.len());

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str("audio/wav")
            .map_err(|e| EvalError::request_failed(&endpoint, e))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model_name.clone());

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::Collaborator(CollaboratorError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body: crate::utils::logging::truncate_text(&body, 200),
            }));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        if parsed.text.trim().is_empty() {
            return Err(EvalError::Collaborator(CollaboratorError::EmptyResponse {
                endpoint,
            }));
        }

        debug!("✓ 转写完成，{} 字符", parsed.text.len());
        Ok(parsed.text)
    }
}
