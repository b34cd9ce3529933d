//! 补救产物 - 能力层
//!
//! 总评分数触发的两种补救：
//!
//! - 示范音频：把文字稿修订为干净的原稿，再交给语音合成，得到可供
//!   模仿的朗读示范
//! - 幻灯片修改建议：先挑出问题最严重的一页，再针对该页的位图给出
//!   一条具体修改建议
//!
//! 补救产物只推送到结果流，不持久化。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::clients::{
    structured_judgment, Judgment, JudgmentRequest, RetryPolicy, SlideRasterizer,
    SpeechSynthesizer,
};
use crate::error::{EvalError, EvalResult, SchemaMismatchError};
use crate::models::StageResult;
use crate::utils::encoding::{encode_base64, png_data_url};

/// 修改建议调用附带的幻灯片页数上限
const MAX_SLIDE_PAGES: u32 = 6;

// ========== 示范音频 ==========

/// 示范音频生成服务
pub struct AudioExemplarService {
    judgment: Arc<dyn Judgment>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct CleanedTranscript {
    transcript: String,
}

impl AudioExemplarService {
    pub fn new(
        judgment: Arc<dyn Judgment>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            judgment,
            synthesizer,
            policy,
        }
    }

    /// 生成示范音频
    pub async fn generate(&self, transcript: &str) -> EvalResult<StageResult> {
        // 第一步：把转写稿修订为干净的原稿
        let prompt = format!(
            r#"下面的发表文字稿由语音转写得到，可能存在错字、口头禅和断句问题。
请在不改变内容的前提下把它修订为适合朗读的干净原稿。
输出必须是 JSON，形如 {{"transcript": "..."}}，不要输出其他内容。

文字稿：
{}"#,
            transcript
        );

        let cleaned: CleanedTranscript = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt),
            &self.policy,
        )
        .await?;
        debug!("原稿修订完成，{} 字符", cleaned.transcript.chars().count());

        // 第二步：合成示范朗读
        let audio = self.synthesizer.synthesize(&cleaned.transcript).await?;
        info!("✓ 示范音频生成完成 ({} 字节)", audio.len());

        Ok(StageResult::RemediationAudio {
            audio_base64: encode_base64(&audio),
            media_type: "audio/wav".to_string(),
        })
    }
}

// ========== 幻灯片修改建议 ==========

/// 幻灯片修改建议服务
pub struct SlideRevisionService {
    judgment: Arc<dyn Judgment>,
    rasterizer: Arc<dyn SlideRasterizer>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SlideFixJudgment {
    most_worst_slide_number: u32,
    fixes: Vec<SlideFixItem>,
}

#[derive(Debug, Deserialize)]
struct SlideFixItem {
    page: u32,
    issue: String,
    suggestion: String,
}

#[derive(Debug, Deserialize)]
struct RefinedSuggestion {
    suggestion: String,
}

impl SlideRevisionService {
    pub fn new(
        judgment: Arc<dyn Judgment>,
        rasterizer: Arc<dyn SlideRasterizer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            judgment,
            rasterizer,
            policy,
        }
    }

    /// 生成针对问题最严重一页的修改建议
    pub async fn generate(&self, slide_document: &[u8]) -> EvalResult<StageResult> {
        // 第一步：通读前几页，挑出问题最严重的一页
        let pages = self.rasterizer.page_count(slide_document).await?;
        let count = pages.min(MAX_SLIDE_PAGES);
        let mut images = Vec::with_capacity(count as usize);
        for page in 1..=count {
            let png = self.rasterizer.rasterize(slide_document, page).await?;
            images.push(png_data_url(&png));
        }

        let prompt = format!(
            r#"你是给幻灯片提出专业修改建议的 AI 助手。
随附的是一份幻灯片的第 1〜{} 页。请对每一页各提出一条修改建议，并指出
问题最严重的一页（most_worst_slide_number，从 1 开始计数）。
输出必须是 JSON，形如
{{"most_worst_slide_number": 1, "fixes": [{{"page": 1, "issue": "...", "suggestion": "..."}}]}}，
issue 与 suggestion 各用一句话。不要输出其他内容。"#,
            count
        );

        let judged: SlideFixJudgment = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt).with_images(images),
            &self.policy,
        )
        .await?;

        let worst_page = judged.most_worst_slide_number.clamp(1, pages.max(1));
        let fix = judged
            .fixes
            .iter()
            .find(|f| f.page == worst_page)
            .or_else(|| judged.fixes.first())
            .ok_or_else(|| {
                EvalError::Schema(SchemaMismatchError::InvalidPayload {
                    detail: "修改建议列表为空".to_string(),
                })
            })?;
        info!("问题最严重的一页: 第 {} 页 ({})", worst_page, fix.issue);

        // 第二步：针对该页的位图把建议落到具体操作
        let worst_png = self.rasterizer.rasterize(slide_document, worst_page).await?;
        let refine_prompt = format!(
            r#"你是幻灯片设计专家。随附的是一页幻灯片的截图。
已知这页的问题：{}
初步修改方向：{}
请把修改方向细化成一条可以直接执行的具体建议（指明动哪些元素、怎么动），
100 字以内。输出必须是 JSON，形如 {{"suggestion": "..."}}，不要输出其他内容。"#,
            fix.issue, fix.suggestion
        );

        let refined: RefinedSuggestion = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(refine_prompt).with_images(vec![png_data_url(&worst_png)]),
            &self.policy,
        )
        .await?;

        Ok(StageResult::RemediationSlide {
            page: worst_page,
            issue: fix.issue.clone(),
            suggestion: refined.suggestion,
        })
    }
}
