//! 语音合成协作方
//!
//! 文本 → 音频字节（wav）。示范音频补救阶段使用。

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::{CollaboratorError, EvalError, EvalResult};

/// 语音合成协作方接口
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// 把原稿朗读为音频字节
    async fn synthesize(&self, text: &str) -> EvalResult<Vec<u8>>;
}

/// OpenAI 兼容语音合成 API 的默认实现
pub struct HttpSpeechSynthesizer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
    voice: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.speech_api_base_url.clone(),
            api_key: config.speech_api_key.clone(),
            model_name: config.speech_model_name.clone(),
            voice: config.speech_voice.clone(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> EvalResult<Vec<u8>> {
        let endpoint = format!("{}/audio/speech", self.base_url);
        debug!("合成语音，原稿 {} 字符", text.chars().count());

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model_name,
                "voice": self.voice,
                "input": text,
                "response_format": "wav",
            }))
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

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(EvalError::Collaborator(CollaboratorError::EmptyResponse {
                endpoint,
            }));
        }

        debug!("✓ 合成完成，{} 字节", bytes.len());
        Ok(bytes.to_vec())
    }
}
