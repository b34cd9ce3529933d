//! 阶段调度器 - 编排层
//!
//! ## 职责
//!
//! 驱动一次提交的完整评估：
//!
//! 1. **并发执行独立阶段**：构成 / 语速 / 前提知识 / 每个人设 / 历史对比
//!    互不依赖，在共享工作池的并发预算内同时执行
//! 2. **聚合屏障**：全部独立阶段落定后聚合为总评；失败维度降级为占位
//!    输入，不会无限阻塞屏障
//! 3. **恰好一次持久化**：总评产出后立即落库，先于补救与通知
//! 4. **条件补救**：按总评分数与阈值追加补救阶段
//! 5. **结果流**：每个阶段完成（成功或失败）即推送事件，运行以一条
//!    终止事件收尾
//!
//! ## 失败语义
//!
//! - 独立阶段 / 补救阶段 / 通知失败：记为 Failed 事件，运行继续
//! - 聚合失败：致命，推送终止错误事件，不落库、不通知
//! - 持久化失败：推送终止错误事件，已推送的总评内容对调用方仍然有效
//! - 调用方断开：尽力而为地取消尚未开始的阶段

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clients::{Collaborators, RetryPolicy};
use crate::config::Config;
use crate::error::{EvalError, EvalResult, PersistenceError, PipelineError};
use crate::models::persona::default_personas;
use crate::models::{
    load_personas, AggregateSummary, Stage, StageEvent, StageKind, StageResult, Submission,
};
use crate::orchestrator::dispatcher::RemediationDispatcher;
use crate::services::{
    AggregateInputs, Aggregator, AudioExemplarService, ComparisonEvaluator, PersonaEvaluator,
    PriorKnowledgeEvaluator, SlideRevisionService, SpeechRateEvaluator, StructureEvaluator,
};
use crate::store::HistoryStore;
use crate::stream::ResultStream;

/// 阶段调度器
///
/// 协作方、存储和工作池在构造时显式注入，生命周期与进程一致；
/// 工作池跨提交共享，约束对外部 API 的总并发。
pub struct Scheduler {
    config: Config,
    collaborators: Collaborators,
    store: Arc<dyn HistoryStore>,
    worker_pool: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        collaborators: Collaborators,
        store: Arc<dyn HistoryStore>,
        worker_pool: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            collaborators,
            store,
            worker_pool,
        }
    }

    /// 执行一次完整评估
    ///
    /// 返回 `Err` 仅表示运行以致命错误收场（聚合失败 / 持久化失败 /
    /// 调用方断开），此前完成的阶段事件都已推送。
    pub async fn run(
        &self,
        submission: Arc<Submission>,
        stream: Arc<ResultStream>,
    ) -> EvalResult<()> {
        let submission_id = submission.submission_id;
        info!(
            "🚀 开始评估 (提交: {}, 用户: {})",
            submission_id, submission.user_id
        );

        let policy = RetryPolicy::from_config(&self.config);

        // 人设清单：配置文件损坏时退回内置默认，不中断评估
        let personas = match load_personas(&self.config.personas_file).await {
            Ok(p) => p,
            Err(e) => {
                warn!("⚠️ 人设配置加载失败，使用内置默认人设: {}", e);
                default_personas()
            }
        };

        // 历史快照：流水线启动时读取一次。对比阶段只看这份快照，
        // 因此永远读不到本次运行自己的写入。
        let history_snapshot = self.store.fetch_history(&submission.user_id).await;

        // ========== 独立阶段并发执行 ==========

        let structure_handle = self.spawn_stage(
            stream.clone(),
            StageKind::Structure,
            StageKind::Structure.label().to_string(),
            {
                let evaluator = StructureEvaluator::new(
                    self.collaborators.judgment.clone(),
                    self.collaborators.rasterizer.clone(),
                    policy.clone(),
                );
                let submission = submission.clone();
                async move {
                    evaluator
                        .evaluate(&submission.transcript_text, &submission.slide_document)
                        .await
                }
            },
        );

        let speech_handle = self.spawn_stage(
            stream.clone(),
            StageKind::SpeechRate,
            StageKind::SpeechRate.label().to_string(),
            {
                let evaluator =
                    SpeechRateEvaluator::new(self.collaborators.judgment.clone(), policy.clone());
                let submission = submission.clone();
                async move {
                    evaluator
                        .evaluate(&submission.audio_recording, &submission.transcript_text)
                        .await
                }
            },
        );

        let knowledge_handle = self.spawn_stage(
            stream.clone(),
            StageKind::PriorKnowledge,
            StageKind::PriorKnowledge.label().to_string(),
            {
                let evaluator = PriorKnowledgeEvaluator::new(
                    self.collaborators.judgment.clone(),
                    policy.clone(),
                );
                let submission = submission.clone();
                async move { evaluator.evaluate(&submission.transcript_text).await }
            },
        );

        let mut persona_handles = Vec::new();
        for persona in &personas {
            let label = format!("人设评估（{}）", persona.label);
            let handle = self.spawn_stage(stream.clone(), StageKind::Persona, label, {
                let evaluator =
                    PersonaEvaluator::new(self.collaborators.judgment.clone(), policy.clone());
                let submission = submission.clone();
                let persona = persona.clone();
                async move { evaluator.evaluate(&persona, &submission.transcript_text).await }
            });
            persona_handles.push((persona.label.clone(), handle));
        }

        let comparison_handle = self.spawn_stage(
            stream.clone(),
            StageKind::Comparison,
            StageKind::Comparison.label().to_string(),
            {
                let evaluator =
                    ComparisonEvaluator::new(self.collaborators.judgment.clone(), policy.clone());
                let submission = submission.clone();
                async move {
                    let history = history_snapshot.map_err(|e| {
                        EvalError::Persistence(PersistenceError::FetchFailed {
                            user_id: submission.user_id.clone(),
                            source: Box::new(e),
                        })
                    })?;
                    evaluator
                        .evaluate(&submission.transcript_text, &history)
                        .await
                }
            },
        );

        // ========== 等待全部独立阶段落定 ==========

        let structure_outcome = join_stage(structure_handle).await;
        let speech_outcome = join_stage(speech_handle).await;
        let knowledge_outcome = join_stage(knowledge_handle).await;
        let mut persona_outcomes = Vec::new();
        for (label, handle) in persona_handles {
            persona_outcomes.push((label, join_stage(handle).await));
        }
        let comparison_outcome = join_stage(comparison_handle).await;

        if stream.is_closed().await {
            info!("调用方已断开，取消剩余阶段 (提交: {})", submission_id);
            return Err(EvalError::Pipeline(PipelineError::StreamClosed));
        }

        let inputs = AggregateInputs {
            structure: structure_outcome.and_then(stage_text),
            speech: speech_outcome.and_then(stage_text),
            knowledge: knowledge_outcome.and_then(stage_text),
            personas: persona_outcomes
                .into_iter()
                .map(|(label, outcome)| (label, outcome.and_then(stage_text)))
                .collect(),
            comparison: comparison_outcome.and_then(stage_text),
        };

        // ========== 聚合屏障 ==========

        let aggregator = Aggregator::new(
            self.collaborators.judgment.clone(),
            policy.clone(),
            self.config.neutral_score,
        );
        let summary = match self.run_aggregate(&aggregator, &inputs).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("❌ 聚合阶段失败，评估中止: {}", e);
                let fatal = EvalError::aggregate_barrier(e.to_string());
                let _ = stream.close(StageEvent::terminal_error(&fatal)).await;
                return Err(fatal);
            }
        };

        // 调用方中途断开时总评事件推不出去，但总评既已产出，持久化
        // 与通知照常进行；只有仅推流的补救阶段失去意义，跳过。
        let aggregate_streamed = stream
            .emit(StageEvent::completed(
                StageKind::Aggregate,
                StageKind::Aggregate.label(),
                StageResult::Aggregate(summary.clone()),
            ))
            .await
            .is_ok();

        // ========== 恰好一次持久化 ==========

        if let Err(e) = self
            .store
            .append_history(&submission.user_id, &summary)
            .await
        {
            let err = EvalError::append_failed(submission.user_id.as_str(), e);
            error!("❌ 持久化失败: {}", err);
            let _ = stream.close(StageEvent::terminal_error(&err)).await;
            return Err(err);
        }

        // ========== 条件补救 ==========

        if aggregate_streamed {
            self.run_remediation(&submission, &stream, &summary, &policy)
                .await;
        }

        // ========== 完成通知 ==========

        self.notify_completion(&submission, &stream, &summary).await;

        // ========== 收尾 ==========

        stream.close(StageEvent::stream_end()).await?;
        info!("✅ 评估完成 (提交: {})", submission_id);
        Ok(())
    }

    /// 以工作池许可 + 独立超时执行聚合调用
    async fn run_aggregate(
        &self,
        aggregator: &Aggregator,
        inputs: &AggregateInputs,
    ) -> EvalResult<AggregateSummary> {
        let _permit = self
            .worker_pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EvalError::Other(format!("工作池已关闭: {}", e)))?;

        match tokio::time::timeout(
            Duration::from_secs(self.config.stage_timeout_secs),
            aggregator.aggregate(inputs),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EvalError::stage_timeout(
                StageKind::Aggregate.as_str(),
                self.config.stage_timeout_secs,
            )),
        }
    }

    /// 按总评分数追加补救阶段，失败隔离在各阶段内
    async fn run_remediation(
        &self,
        submission: &Arc<Submission>,
        stream: &Arc<ResultStream>,
        summary: &AggregateSummary,
        policy: &RetryPolicy,
    ) {
        let dispatcher = RemediationDispatcher::new(self.config.remediation_threshold);
        let kinds = dispatcher.decide(summary);
        if kinds.is_empty() {
            info!("各维度分数高于阈值，无需补救");
            return;
        }

        let mut handles = Vec::new();
        for kind in kinds {
            let handle = match kind {
                StageKind::RemediationAudio => self.spawn_stage(
                    stream.clone(),
                    kind,
                    kind.label().to_string(),
                    {
                        let service = AudioExemplarService::new(
                            self.collaborators.judgment.clone(),
                            self.collaborators.synthesizer.clone(),
                            policy.clone(),
                        );
                        let submission = submission.clone();
                        async move { service.generate(&submission.transcript_text).await }
                    },
                ),
                StageKind::RemediationSlide => self.spawn_stage(
                    stream.clone(),
                    kind,
                    kind.label().to_string(),
                    {
                        let service = SlideRevisionService::new(
                            self.collaborators.judgment.clone(),
                            self.collaborators.rasterizer.clone(),
                            policy.clone(),
                        );
                        let submission = submission.clone();
                        async move { service.generate(&submission.slide_document).await }
                    },
                ),
                _ => continue,
            };
            handles.push(handle);
        }

        for handle in handles {
            let _ = join_stage(handle).await;
        }
    }

    /// 发送完成通知（尽力而为）
    async fn notify_completion(
        &self,
        submission: &Arc<Submission>,
        stream: &Arc<ResultStream>,
        summary: &AggregateSummary,
    ) {
        let Some(recipient) = &submission.notification_address else {
            debug!("未提供通知地址，跳过完成通知");
            return;
        };

        let body = format!(
            "你的发表评估已完成。\n\n总评：{}\n各维度分数：构成 {} / 语速 {} / 前提知识 {} / 人设 {} / 对比 {}",
            summary.narrative,
            summary.structure_score,
            summary.speech_score,
            summary.knowledge_score,
            summary.personas_score,
            summary.comparison_score,
        );

        match self
            .collaborators
            .notifier
            .notify(recipient, "发表评估完成", &body)
            .await
        {
            Ok(()) => {
                info!("✓ 完成通知已发送: {}", recipient);
                let _ = stream
                    .emit(StageEvent::completed(
                        StageKind::Notify,
                        StageKind::Notify.label(),
                        StageResult::Notify {
                            recipient: recipient.clone(),
                        },
                    ))
                    .await;
            }
            Err(e) => {
                warn!("⚠️ 完成通知发送失败（不影响评估结果）: {}", e);
                let _ = stream
                    .emit(StageEvent::failed(
                        StageKind::Notify,
                        StageKind::Notify.label(),
                        &e,
                    ))
                    .await;
            }
        }
    }

    /// 把一个阶段作为受控任务启动
    ///
    /// - 先取工作池许可（跨提交共享的并发预算）
    /// - 调用方已断开时直接放弃，不再消耗协作方额度
    /// - 阶段体包在独立超时里，超时转为 Failed 而不是重试
    /// - 完成（成功或失败）即推送对应事件；推送失败说明调用方断开
    fn spawn_stage(
        &self,
        stream: Arc<ResultStream>,
        kind: StageKind,
        label: String,
        fut: impl Future<Output = EvalResult<StageResult>> + Send + 'static,
    ) -> JoinHandle<Option<StageResult>> {
        let pool = self.worker_pool.clone();
        let timeout_secs = self.config.stage_timeout_secs;
        let verbose = self.config.verbose_logging;

        tokio::spawn(async move {
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };

            if stream.is_closed().await {
                debug!("调用方已断开，跳过阶段: {}", label);
                return None;
            }

            if verbose {
                info!("▶️ 阶段开始: {} (超时 {} 秒)", label, timeout_secs);
            }

            let mut stage = Stage::with_label(kind, label);
            stage.start();

            let outcome = match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await
            {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(EvalError::stage_timeout(kind.as_str(), timeout_secs)),
            };

            match outcome {
                Ok(result) => {
                    stage.complete(result.clone());
                    info!("✓ 阶段完成: {}", stage.label);
                    match stream
                        .emit(StageEvent::completed(kind, stage.label.clone(), result.clone()))
                        .await
                    {
                        Ok(_) => Some(result),
                        Err(_) => None,
                    }
                }
                Err(e) => {
                    stage.fail(e.to_string());
                    warn!("⚠️ 阶段失败: {} - {}", stage.label, e);
                    let _ = stream
                        .emit(StageEvent::failed(kind, stage.label.clone(), &e))
                        .await;
                    None
                }
            }
        })
    }
}

/// 等待阶段任务结束；任务本身崩溃按失败处理
async fn join_stage(handle: JoinHandle<Option<StageResult>>) -> Option<StageResult> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("阶段任务执行失败: {}", e);
            None
        }
    }
}

/// 把阶段结果压成聚合输入用的文本
fn stage_text(result: StageResult) -> Option<String> {
    match result {
        StageResult::Structure { narrative } => Some(narrative),
        StageResult::SpeechRate {
            rate_review,
            style_review,
        } => Some(format!("语速：{}\n讲话方式：{}", rate_review, style_review)),
        StageResult::PriorKnowledge { summary, terms } => {
            let mut text = summary;
            if !terms.is_empty() {
                text.push_str("\n识别出的术语：");
                for term in &terms {
                    text.push_str(&format!(
                        "\n- {}（需要{}水平，讲解程度：{}）",
                        term.term, term.level, term.explained_level
                    ));
                }
            }
            Some(text)
        }
        StageResult::Persona { feedback, .. } => Some(feedback),
        StageResult::Comparison { narrative } => Some(narrative),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeTerm;

    #[test]
    fn test_stage_text_flattens_speech_rate() {
        let text = stage_text(StageResult::SpeechRate {
            rate_review: "语速偏快".to_string(),
            style_review: "口头禅较多".to_string(),
        })
        .unwrap();
        assert!(text.contains("语速偏快"));
        assert!(text.contains("口头禅较多"));
    }

    #[test]
    fn test_stage_text_lists_knowledge_terms() {
        let text = stage_text(StageResult::PriorKnowledge {
            summary: "前提知识整体适量".to_string(),
            terms: vec![KnowledgeTerm {
                term: "拜占庭容错".to_string(),
                description: "分布式一致性概念".to_string(),
                level: "专业人士".to_string(),
                explained_level: "未讲解".to_string(),
            }],
        })
        .unwrap();
        assert!(text.contains("拜占庭容错"));
        assert!(text.contains("未讲解"));
    }

    #[test]
    fn test_stage_text_ignores_aggregate() {
        let result = StageResult::Aggregate(AggregateSummary {
            narrative: "总评".to_string(),
            structure_score: 3,
            speech_score: 3,
            knowledge_score: 3,
            personas_score: 3,
            comparison_score: 3,
        });
        assert!(stage_text(result).is_none());
    }
}
