//! 结构化判断协作方（LLM）
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务
//!
//! 所有"把协作方输出解析成预期结构"的逻辑收拢在本模块的
//! [`parse_structured`] 一处：输出不符合预期时统一返回
//! `SchemaMismatch`，各调用点不再各自探测返回形状。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CollaboratorError, EvalError, EvalResult};

/// 一次判断请求
#[derive(Debug, Clone)]
pub struct JudgmentRequest {
    /// 系统消息（可选）
    pub system: Option<String>,
    /// 用户消息
    pub user: String,
    /// 随消息附带的图片（data URL 或普通 URL）
    pub images: Vec<String>,
}

impl JudgmentRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            images: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// 结构化判断协作方接口
#[async_trait]
pub trait Judgment: Send + Sync {
    /// 发送一次判断请求，返回原始文本响应
    async fn generate(&self, request: JudgmentRequest) -> EvalResult<String>;
}

/// 基于 async-openai 的默认实现
pub struct OpenAiJudgment {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiJudgment {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl Judgment for OpenAiJudgment {
    async fn generate(&self, request: JudgmentRequest) -> EvalResult<String> {
        debug!("调用判断协作方，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", request.user.len());
        if !request.images.is_empty() {
            debug!("包含 {} 张图片", request.images.len());
        }

        let mut messages = Vec::new();

        if let Some(sys_msg) = &request.system {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()
                .map_err(|e| EvalError::request_failed("chat/completions", e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        // 构建用户消息（有图片时走 Vision 多段内容）
        let user_msg = if request.images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.as_str())
                .build()
                .map_err(|e| EvalError::request_failed("chat/completions", e))?
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.user.clone(),
                },
            ));
            for url in &request.images {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(|e| EvalError::request_failed("chat/completions", e))?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(2048u32)
            .build()
            .map_err(|e| EvalError::request_failed("chat/completions", e))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| {
                warn!("判断协作方调用失败: {}", e);
                EvalError::request_failed("chat/completions", e)
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                EvalError::Collaborator(CollaboratorError::EmptyResponse {
                    endpoint: "chat/completions".to_string(),
                })
            })?;

        Ok(content.trim().to_string())
    }
}

// ========== schema 校验边界 ==========

/// 把协作方的原始文本解析为预期的结构化类型
///
/// 允许输出被 ```json 围栏包裹或混入少量说明文字；剥离围栏后取第一个
/// '{' 到最后一个 '}' 之间的内容尝试解析。解析失败统一返回
/// `SchemaMismatch`。
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> EvalResult<T> {
    let stripped = match Regex::new(r"```(?:json)?\s*([\s\S]*?)```") {
        Ok(fence) => fence
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| raw.to_string()),
        Err(_) => raw.to_string(),
    };

    let trimmed = stripped.trim();
    match serde_json::from_str::<T>(trimmed) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            // 退一步：截取最外层大括号之间的内容再试一次
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(EvalError::schema_unparsable(raw, first_err))
        }
    }
}

// ========== 重试策略 ==========

/// 阶段内的重试策略
///
/// 瞬时错误（限流 / 超时 / 网络抖动）按退避重试有限次；结构化输出
/// 不合法只额外重试一次，之后交由调用方降级或中止。重试只发生在
/// 阶段内部，绝不向兄弟阶段扩散。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_transient_retries: usize,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_transient_retries: config.max_transient_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1 << attempt.min(6)))
    }
}

/// 调用判断协作方并返回纯文本，瞬时错误按策略重试
pub async fn text_judgment(
    judgment: &dyn Judgment,
    request: JudgmentRequest,
    policy: &RetryPolicy,
) -> EvalResult<String> {
    let mut attempt = 0;
    loop {
        match judgment.generate(request.clone()).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_transient_retries => {
                warn!(
                    "判断调用瞬时失败 (第 {} 次): {}，退避后重试",
                    attempt + 1,
                    e
                );
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 调用判断协作方并解析为结构化类型
///
/// 瞬时错误按策略重试；解析失败额外重试一次。
pub async fn structured_judgment<T: DeserializeOwned>(
    judgment: &dyn Judgment,
    request: JudgmentRequest,
    policy: &RetryPolicy,
) -> EvalResult<T> {
    let mut schema_retried = false;
    loop {
        let raw = text_judgment(judgment, request.clone(), policy).await?;
        match parse_structured::<T>(&raw) {
            Ok(value) => return Ok(value),
            Err(e) if !schema_retried => {
                warn!("结构化输出解析失败，重试一次: {}", e);
                schema_retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}
