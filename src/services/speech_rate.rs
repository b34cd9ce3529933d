//! 语速与讲话方式评估 - 能力层
//!
//! 输入：录音（wav 字节）+ 文字稿
//! 输出：语速评价 + 讲话方式评价
//!
//! 录音本身不交给判断协作方：从 wav 头读出时长，结合文字稿长度算出
//! 每分钟字数，把数字连同文字稿一起交给协作方评价。

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::clients::{structured_judgment, Judgment, JudgmentRequest, RetryPolicy};
use crate::error::EvalResult;
use crate::models::StageResult;

/// 语速评估器
pub struct SpeechRateEvaluator {
    judgment: Arc<dyn Judgment>,
    policy: RetryPolicy,
}

/// 协作方返回的结构
#[derive(Debug, Deserialize)]
struct SpeechRateJudgment {
    rate_review: String,
    style_review: String,
}

impl SpeechRateEvaluator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: RetryPolicy) -> Self {
        Self { judgment, policy }
    }

    /// 评估语速与讲话方式
    pub async fn evaluate(&self, audio: &[u8], transcript: &str) -> EvalResult<StageResult> {
        let rate_info = match wav_duration_secs(audio) {
            Some(secs) if secs > 0.0 => {
                let chars = transcript.chars().count() as f64;
                let cpm = chars / secs * 60.0;
                debug!("录音时长 {:.1} 秒，约 {:.0} 字/分钟", secs, cpm);
                format!("录音时长约 {:.0} 秒，平均语速约 {:.0} 字/分钟。", secs, cpm)
            }
            _ => "录音时长无法解析，请仅根据文字稿推断语速节奏。".to_string(),
        };

        let prompt = format!(
            r#"你是负责评估发表的 AI 助手之一，专门评估"语速与讲话方式"。
{}
请根据以上信息和下面的文字稿，分别就语速（过快 / 过慢 / 节奏变化）和
讲话方式（口头禅、停顿、语气）给出简洁的中文评价，各 1〜3 句。
输出必须是 JSON，形如 {{"rate_review": "...", "style_review": "..."}}，
不要输出其他内容。

文字稿：
{}"#,
            rate_info, transcript
        );

        let judged: SpeechRateJudgment = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt),
            &self.policy,
        )
        .await?;

        Ok(StageResult::SpeechRate {
            rate_review: judged.rate_review,
            style_review: judged.style_review,
        })
    }
}

/// 从 wav 头估算录音时长（秒）
///
/// 只支持标准 RIFF/WAVE 布局：字节率取自 fmt 块固定偏移，数据长度取
/// 文件剩余部分。解析不了就返回 None，由调用方降级处理。
fn wav_duration_secs(audio: &[u8]) -> Option<f64> {
    if audio.len() < 44 || &audio[0..4] != b"RIFF" || &audio[8..12] != b"WAVE" {
        return None;
    }
    let byte_rate = u32::from_le_bytes(audio[28..32].try_into().ok()?);
    if byte_rate == 0 {
        return None;
    }
    let data_len = (audio.len() - 44) as f64;
    Some(data_len / byte_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造一个最小的 wav 头
    fn wav_bytes(byte_rate: u32, data_len: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend(std::iter::repeat(0u8).take(data_len));
        bytes
    }

    #[test]
    fn test_wav_duration_from_header() {
        // 16000 字节/秒，32000 字节数据 → 2 秒
        let audio = wav_bytes(16000, 32000);
        let secs = wav_duration_secs(&audio).unwrap();
        assert!((secs - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_wav_duration_rejects_non_wav() {
        assert!(wav_duration_secs(b"not a wav file").is_none());
        assert!(wav_duration_secs(&wav_bytes(0, 100)).is_none());
    }
}
