use std::fmt;

/// 流水线错误类型
///
/// 按照错误的处理策略分类：
/// - `Collaborator`：外部协作方的瞬时错误，允许在本阶段内有限次重试
/// - `Schema`：协作方返回的结构化输出无法解析，重试一次后降级
/// - `Persistence`：历史记录写入失败，作为终止事件上报但不撤回已推送内容
/// - `Pipeline`：聚合屏障无法满足等致命错误，终止整个评估
/// - `Config`：配置错误
#[derive(Debug)]
pub enum EvalError {
    /// 外部协作方调用错误（瞬时，可重试）
    Collaborator(CollaboratorError),
    /// 结构化输出解析错误
    Schema(SchemaMismatchError),
    /// 历史记录持久化错误
    Persistence(PersistenceError),
    /// 流水线致命错误
    Pipeline(PipelineError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Collaborator(e) => write!(f, "协作方错误: {}", e),
            EvalError::Schema(e) => write!(f, "结构化输出错误: {}", e),
            EvalError::Persistence(e) => write!(f, "持久化错误: {}", e),
            EvalError::Pipeline(e) => write!(f, "流水线错误: {}", e),
            EvalError::Config(e) => write!(f, "配置错误: {}", e),
            EvalError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Collaborator(e) => Some(e),
            EvalError::Schema(e) => Some(e),
            EvalError::Persistence(e) => Some(e),
            EvalError::Pipeline(e) => Some(e),
            EvalError::Config(e) => Some(e),
            EvalError::Other(_) => None,
        }
    }
}

/// 外部协作方错误
#[derive(Debug)]
pub enum CollaboratorError {
    /// 请求失败（网络层）
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求频率限制
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// 阶段超时
    Timeout {
        stage: String,
        seconds: u64,
    },
    /// 协作方返回非成功状态码
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 协作方返回空结果
    EmptyResponse {
        endpoint: String,
    },
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorError::RequestFailed { endpoint, source } => {
                write!(f, "请求失败 ({}): {}", endpoint, source)
            }
            CollaboratorError::RateLimited {
                endpoint,
                retry_after,
            } => {
                write!(f, "请求被限流 ({}), 建议等待: {:?}秒", endpoint, retry_after)
            }
            CollaboratorError::Timeout { stage, seconds } => {
                write!(f, "阶段 {} 在 {} 秒内未完成", stage, seconds)
            }
            CollaboratorError::BadStatus {
                endpoint,
                status,
                body,
            } => {
                write!(f, "协作方返回错误状态 ({}): {} {}", endpoint, status, body)
            }
            CollaboratorError::EmptyResponse { endpoint } => {
                write!(f, "协作方返回空结果: {}", endpoint)
            }
        }
    }
}

impl std::error::Error for CollaboratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollaboratorError::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 结构化输出解析错误
#[derive(Debug)]
pub enum SchemaMismatchError {
    /// 返回内容无法解析为预期 JSON 结构
    Unparsable {
        /// 原始返回内容（截断后）
        raw: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 解析成功但字段取值非法
    InvalidPayload {
        detail: String,
    },
}

impl fmt::Display for SchemaMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMismatchError::Unparsable { raw, source } => {
                write!(f, "无法解析协作方输出 (内容: {}): {}", raw, source)
            }
            SchemaMismatchError::InvalidPayload { detail } => {
                write!(f, "协作方输出字段非法: {}", detail)
            }
        }
    }
}

impl std::error::Error for SchemaMismatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaMismatchError::Unparsable { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 历史记录持久化错误
#[derive(Debug)]
pub enum PersistenceError {
    /// 写入历史记录失败
    AppendFailed {
        user_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 读取历史记录失败
    FetchFailed {
        user_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::AppendFailed { user_id, source } => {
                write!(f, "写入历史记录失败 (用户: {}): {}", user_id, source)
            }
            PersistenceError::FetchFailed { user_id, source } => {
                write!(f, "读取历史记录失败 (用户: {}): {}", user_id, source)
            }
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::AppendFailed { source, .. }
            | PersistenceError::FetchFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 流水线致命错误
#[derive(Debug)]
pub enum PipelineError {
    /// 聚合阶段无法产出结果（重试耗尽）
    AggregateBarrier {
        reason: String,
    },
    /// 结果流已关闭（调用方断开）
    StreamClosed,
    /// 转写失败，评估无法开始
    TranscriptionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::AggregateBarrier { reason } => {
                write!(f, "聚合阶段失败: {}", reason)
            }
            PipelineError::StreamClosed => {
                write!(f, "结果流已关闭，调用方可能已断开")
            }
            PipelineError::TranscriptionFailed { source } => {
                write!(f, "音频转写失败: {}", source)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::TranscriptionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 人设配置文件无法解析
    PersonaFileInvalid {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::PersonaFileInvalid { path, source } => {
                write!(f, "人设配置文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::PersonaFileInvalid { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if err.is_timeout() {
            EvalError::Collaborator(CollaboratorError::Timeout {
                stage: endpoint,
                seconds: 0,
            })
        } else {
            EvalError::Collaborator(CollaboratorError::RequestFailed {
                endpoint,
                source: Box::new(err),
            })
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Schema(SchemaMismatchError::Unparsable {
            raw: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<crate::store::StoreError> for EvalError {
    fn from(err: crate::store::StoreError) -> Self {
        EvalError::Persistence(PersistenceError::AppendFailed {
            user_id: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl EvalError {
    /// 创建协作方请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EvalError::Collaborator(CollaboratorError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建阶段超时错误
    pub fn stage_timeout(stage: impl Into<String>, seconds: u64) -> Self {
        EvalError::Collaborator(CollaboratorError::Timeout {
            stage: stage.into(),
            seconds,
        })
    }

    /// 创建结构化输出解析错误（原始内容会被截断后保留）
    pub fn schema_unparsable(
        raw: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EvalError::Schema(SchemaMismatchError::Unparsable {
            raw: crate::utils::logging::truncate_text(raw, 200),
            source: Box::new(source),
        })
    }

    /// 创建持久化失败错误
    pub fn append_failed(
        user_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EvalError::Persistence(PersistenceError::AppendFailed {
            user_id: user_id.into(),
            source: Box::new(source),
        })
    }

    /// 创建聚合屏障失败错误
    pub fn aggregate_barrier(reason: impl Into<String>) -> Self {
        EvalError::Pipeline(PipelineError::AggregateBarrier {
            reason: reason.into(),
        })
    }

    /// 是否属于瞬时错误（限流 / 超时 / 网络抖动），允许有限次重试
    pub fn is_transient(&self) -> bool {
        matches!(self, EvalError::Collaborator(_))
    }

    /// 错误分类标签，写入 StageEvent 的错误记录
    pub fn tag(&self) -> &'static str {
        match self {
            EvalError::Collaborator(_) => "transient",
            EvalError::Schema(_) => "schema_mismatch",
            EvalError::Persistence(_) => "persistence",
            EvalError::Pipeline(_) => "fatal",
            EvalError::Config(_) => "config",
            EvalError::Other(_) => "other",
        }
    }
}

// ========== Result 类型别名 ==========

/// 流水线结果类型
pub type EvalResult<T> = Result<T, EvalError>;
