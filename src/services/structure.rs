//! 发表构成评估 - 能力层
//!
//! 输入：文字稿 + 幻灯片（前几页的光栅图）
//! 输出：对发表构成的叙述性评价

use std::sync::Arc;

use tracing::debug;

use crate::clients::{text_judgment, Judgment, JudgmentRequest, RetryPolicy, SlideRasterizer};
use crate::error::EvalResult;
use crate::models::StageResult;
use crate::utils::encoding::png_data_url;

/// 附给判断协作方的幻灯片页数上限
const MAX_SLIDE_PAGES: u32 = 6;

/// 发表构成评估器
pub struct StructureEvaluator {
    judgment: Arc<dyn Judgment>,
    rasterizer: Arc<dyn SlideRasterizer>,
    policy: RetryPolicy,
}

impl StructureEvaluator {
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

    /// 评估发表构成
    pub async fn evaluate(
        &self,
        transcript: &str,
        slide_document: &[u8],
    ) -> EvalResult<StageResult> {
        let images = self.rasterize_pages(slide_document).await?;
        debug!("构成评估附带 {} 页幻灯片", images.len());

        let prompt = format!(
            r#"你是负责评估发表的 AI 助手之一。
请结合以下发表的文字稿和随附的幻灯片页面，就"发表构成"（导入是否清楚、
展开是否有逻辑、总结是否有力、幻灯片与讲述是否对应）给出 300 字以内的评价。
不要空泛地夸奖，发现问题请具体指出。

文字稿：
{}"#,
            transcript
        );

        let narrative = text_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt).with_images(images),
            &self.policy,
        )
        .await?;

        Ok(StageResult::Structure { narrative })
    }

    /// 把前几页幻灯片渲染为 data URL
    async fn rasterize_pages(&self, slide_document: &[u8]) -> EvalResult<Vec<String>> {
        let pages = self.rasterizer.page_count(slide_document).await?;
        let count = pages.min(MAX_SLIDE_PAGES);

        let mut images = Vec::with_capacity(count as usize);
        for page in 1..=count {
            let png = self.rasterizer.rasterize(slide_document, page).await?;
            images.push(png_data_url(&png));
        }
        Ok(images)
    }
}
