//! 外部协作方客户端
//!
//! 流水线通过窄接口调用而不实现的外部系统都在这里：
//!
//! - `Judgment` - 结构化判断（LLM），唯一的 schema 校验边界
//! - `Transcriber` - 语音转写（音频字节 → 文字稿）
//! - `SpeechSynthesizer` - 语音合成（文本 → 音频字节）
//! - `SlideRasterizer` - 幻灯片光栅化（文档 + 页码 → 位图）
//! - `Notifier` - 完成通知（尽力而为，失败只记日志）
//!
//! 每个协作方都是 trait + 默认实现，调度器只依赖 trait 对象，
//! 测试用 mock 实现替换。

pub mod judgment;
pub mod notifier;
pub mod rasterizer;
pub mod synthesizer;
pub mod transcriber;

pub use judgment::{
    parse_structured, structured_judgment, text_judgment, Judgment, JudgmentRequest,
    OpenAiJudgment, RetryPolicy,
};
pub use notifier::{HttpNotifier, Notifier};
pub use rasterizer::{HttpSlideRasterizer, SlideRasterizer};
pub use synthesizer::{HttpSpeechSynthesizer, SpeechSynthesizer};
pub use transcriber::{Transcriber, WhisperTranscriber};

use std::sync::Arc;

use crate::config::Config;

/// 协作方集合
///
/// 在进程启动时构建一次，作为显式依赖注入调度器，生命周期与进程一致。
#[derive(Clone)]
pub struct Collaborators {
    pub judgment: Arc<dyn Judgment>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub rasterizer: Arc<dyn SlideRasterizer>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// 按配置构建全部默认实现
    pub fn from_config(config: &Config) -> Self {
        Self {
            judgment: Arc::new(OpenAiJudgment::new(config)),
            transcriber: Arc::new(WhisperTranscriber::new(config)),
            synthesizer: Arc::new(HttpSpeechSynthesizer::new(config)),
            rasterizer: Arc::new(HttpSlideRasterizer::new(config)),
            notifier: Arc::new(HttpNotifier::new(config)),
        }
    }
}
