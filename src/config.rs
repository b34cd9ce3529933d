/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP 服务监听地址
    pub bind_addr: String,
    /// SQLite 数据库路径
    pub database_url: String,
    /// 独立阶段的全局并发上限（与外部 API 的并发预算对齐）
    pub max_concurrent_stages: usize,
    /// 单个阶段的超时时间（秒）
    pub stage_timeout_secs: u64,
    /// 瞬时错误的最大重试次数（阶段内）
    pub max_transient_retries: usize,
    /// 重试退避基数（毫秒）
    pub retry_backoff_ms: u64,
    /// 触发补救的分数阈值（<= 该值则触发）
    pub remediation_threshold: u8,
    /// 上游阶段失败时聚合使用的中性分数
    pub neutral_score: u8,
    /// 人设配置文件路径
    pub personas_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 语音转写配置 ---
    pub transcribe_api_base_url: String,
    pub transcribe_api_key: String,
    pub transcribe_model_name: String,
    // --- 语音合成配置 ---
    pub speech_api_base_url: String,
    pub speech_api_key: String,
    pub speech_model_name: String,
    pub speech_voice: String,
    // --- 幻灯片光栅化服务 ---
    pub rasterizer_api_base_url: String,
    // --- 通知网关 ---
    pub notify_api_base_url: String,
    pub notify_sender_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite://evaluation.db?mode=rwc".to_string(),
            max_concurrent_stages: 4,
            stage_timeout_secs: 120,
            max_transient_retries: 2,
            retry_backoff_ms: 500,
            remediation_threshold: 3,
            neutral_score: 3,
            personas_file: "personas.toml".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            transcribe_api_base_url: "https://api.openai.com/v1".to_string(),
            transcribe_api_key: String::new(),
            transcribe_model_name: "whisper-1".to_string(),
            speech_api_base_url: "https://api.openai.com/v1".to_string(),
            speech_api_key: String::new(),
            speech_model_name: "tts-1".to_string(),
            speech_voice: "alloy".to_string(),
            rasterizer_api_base_url: "http://localhost:9100".to_string(),
            notify_api_base_url: "http://localhost:9200".to_string(),
            notify_sender_name: "AI 发表评估助手".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(default.bind_addr),
            database_url: std::env::var("DATABASE_URL").unwrap_or(default.database_url),
            max_concurrent_stages: std::env::var("MAX_CONCURRENT_STAGES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_stages),
            stage_timeout_secs: std::env::var("STAGE_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.stage_timeout_secs),
            max_transient_retries: std::env::var("MAX_TRANSIENT_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_transient_retries),
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_backoff_ms),
            remediation_threshold: std::env::var("REMEDIATION_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(default.remediation_threshold),
            neutral_score: std::env::var("NEUTRAL_SCORE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.neutral_score),
            personas_file: std::env::var("PERSONAS_FILE").unwrap_or(default.personas_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            transcribe_api_base_url: std::env::var("TRANSCRIBE_API_BASE_URL").unwrap_or(default.transcribe_api_base_url),
            transcribe_api_key: std::env::var("TRANSCRIBE_API_KEY").unwrap_or(default.transcribe_api_key),
            transcribe_model_name: std::env::var("TRANSCRIBE_MODEL_NAME").unwrap_or(default.transcribe_model_name),
            speech_api_base_url: std::env::var("SPEECH_API_BASE_URL").unwrap_or(default.speech_api_base_url),
            speech_api_key: std::env::var("SPEECH_API_KEY").unwrap_or(default.speech_api_key),
            speech_model_name: std::env::var("SPEECH_MODEL_NAME").unwrap_or(default.speech_model_name),
            speech_voice: std::env::var("SPEECH_VOICE").unwrap_or(default.speech_voice),
            rasterizer_api_base_url: std::env::var("RASTERIZER_API_BASE_URL").unwrap_or(default.rasterizer_api_base_url),
            notify_api_base_url: std::env::var("NOTIFY_API_BASE_URL").unwrap_or(default.notify_api_base_url),
            notify_sender_name: std::env::var("NOTIFY_SENDER_NAME").unwrap_or(default.notify_sender_name),
        }
    }
}
