//! 补救分发器 - 编排层
//!
//! 检查总评分数，决定要追加哪些补救阶段。纯决策函数：不启动任务、
//! 不做 IO，阈值可配置，部署方调整阈值不需要动流水线逻辑。

use crate::models::{AggregateSummary, StageKind};

/// 补救分发器
#[derive(Debug, Clone)]
pub struct RemediationDispatcher {
    /// 分数小于等于该值时触发补救
    threshold: u8,
}

impl RemediationDispatcher {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// 决定要启动的补救阶段
    ///
    /// - `speech_score` 达到阈值 → 示范音频
    /// - `structure_score` 达到阈值 → 幻灯片修改建议
    pub fn decide(&self, summary: &AggregateSummary) -> Vec<StageKind> {
        let mut kinds = Vec::new();
        if summary.speech_score <= self.threshold {
            kinds.push(StageKind::RemediationAudio);
        }
        if summary.structure_score <= self.threshold {
            kinds.push(StageKind::RemediationSlide);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(structure: u8, speech: u8) -> AggregateSummary {
        AggregateSummary {
            narrative: "测试总评".to_string(),
            structure_score: structure,
            speech_score: speech,
            knowledge_score: 4,
            personas_score: 4,
            comparison_score: 4,
        }
    }

    #[test]
    fn test_high_scores_trigger_nothing() {
        let dispatcher = RemediationDispatcher::new(3);
        assert!(dispatcher.decide(&summary(5, 5)).is_empty());
        assert!(dispatcher.decide(&summary(4, 4)).is_empty());
    }

    #[test]
    fn test_low_speech_triggers_audio_exemplar() {
        let dispatcher = RemediationDispatcher::new(3);
        assert_eq!(
            dispatcher.decide(&summary(5, 3)),
            vec![StageKind::RemediationAudio]
        );
    }

    #[test]
    fn test_low_structure_triggers_slide_revision() {
        let dispatcher = RemediationDispatcher::new(3);
        assert_eq!(
            dispatcher.decide(&summary(2, 5)),
            vec![StageKind::RemediationSlide]
        );
    }

    #[test]
    fn test_both_low_triggers_both() {
        let dispatcher = RemediationDispatcher::new(3);
        let kinds = dispatcher.decide(&summary(1, 1));
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&StageKind::RemediationAudio));
        assert!(kinds.contains(&StageKind::RemediationSlide));
    }

    #[test]
    fn test_threshold_is_configurable() {
        // 阈值 5 时任何分数都触发
        let dispatcher = RemediationDispatcher::new(5);
        assert_eq!(dispatcher.decide(&summary(5, 5)).len(), 2);

        // 阈值 1 时只有最低分触发
        let dispatcher = RemediationDispatcher::new(1);
        assert!(dispatcher.decide(&summary(2, 2)).is_empty());
        assert_eq!(dispatcher.decide(&summary(1, 2)).len(), 1);
    }
}
