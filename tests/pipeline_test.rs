//! 流水线集成测试
//!
//! 用进程内 mock 替换全部外部协作方，驱动完整的调度器运行，验证
//! 依赖顺序、失败隔离、流式推送、条件补救与恰好一次持久化。

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use presentation_evaluator::clients::{
    Collaborators, Judgment, JudgmentRequest, Notifier, SlideRasterizer, SpeechSynthesizer,
    Transcriber,
};
use presentation_evaluator::config::Config;
use presentation_evaluator::error::{EvalError, EvalResult};
use presentation_evaluator::models::{AggregateSummary, HistoryRecord, StageEvent, Submission};
use presentation_evaluator::orchestrator::Scheduler;
use presentation_evaluator::store::{HistoryStore, StoreError};
use presentation_evaluator::stream::ResultStream;

// ========== mock 协作方 ==========

/// 按提示词特征路由到预设响应的判断协作方
struct MockJudgment {
    aggregate_scores: [u8; 5],
    /// 聚合调用始终返回无法解析的输出
    aggregate_garbage: bool,
    /// 前提知识调用先失败这么多次（瞬时错误）
    pk_failures_remaining: Mutex<usize>,
    /// 记录全部收到的用户提示词
    prompts: Mutex<Vec<String>>,
}

impl MockJudgment {
    fn healthy(aggregate_scores: [u8; 5]) -> Arc<Self> {
        Arc::new(Self {
            aggregate_scores,
            aggregate_garbage: false,
            pk_failures_remaining: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn with_pk_failures(aggregate_scores: [u8; 5], failures: usize) -> Arc<Self> {
        Arc::new(Self {
            aggregate_scores,
            aggregate_garbage: false,
            pk_failures_remaining: Mutex::new(failures),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn with_garbage_aggregate() -> Arc<Self> {
        Arc::new(Self {
            aggregate_scores: [3; 5],
            aggregate_garbage: true,
            pk_failures_remaining: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Judgment for MockJudgment {
    async fn generate(&self, request: JudgmentRequest) -> EvalResult<String> {
        let user = request.user;
        self.prompts.lock().unwrap().push(user.clone());

        // 聚合（提示词含全部维度，必须最先匹配）
        if user.contains("各评估助手") {
            if self.aggregate_garbage {
                return Ok("抱歉，我无法输出 JSON。".to_string());
            }
            let [s, sp, k, p, c] = self.aggregate_scores;
            return Ok(format!(
                r#"{{"summary": "整体完成度较高", "structure_score": {}, "speech_score": {}, "knowledge_score": {}, "personas_score": {}, "comparison_score": {}}}"#,
                s, sp, k, p, c
            ));
        }
        if user.contains("rate_review") {
            return Ok(
                r#"{"rate_review": "语速适中", "style_review": "表达自然"}"#.to_string(),
            );
        }
        if user.contains("explained_level") {
            let mut remaining = self.pk_failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EvalError::stage_timeout("prior_knowledge", 1));
            }
            return Ok(r#"{"summary": "前提知识适量", "terms": []}"#.to_string());
        }
        if user.contains("你现在是") {
            return Ok(r#"{"feedback": "内容有说服力"}"#.to_string());
        }
        if user.contains("过往的评估记录") {
            return Ok("比上次更有条理。".to_string());
        }
        if user.contains("发表构成") {
            return Ok("构成清晰，层次分明。".to_string());
        }
        if user.contains("适合朗读") {
            return Ok(r#"{"transcript": "修订后的朗读原稿"}"#.to_string());
        }
        if user.contains("most_worst_slide_number") {
            return Ok(
                r#"{"most_worst_slide_number": 1, "fixes": [{"page": 1, "issue": "文字过密", "suggestion": "精简要点"}]}"#
                    .to_string(),
            );
        }
        if user.contains("细化成") {
            return Ok(r#"{"suggestion": "把正文从 12 行精简到 5 行"}"#.to_string());
        }
        Ok("好的。".to_string())
    }
}

struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &[u8], _filename: &str) -> EvalResult<String> {
        Ok("这是转写的文字稿".to_string())
    }
}

struct MockSynthesizer;

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> EvalResult<Vec<u8>> {
        Ok(vec![0u8; 64])
    }
}

struct MockRasterizer;

#[async_trait]
impl SlideRasterizer for MockRasterizer {
    async fn page_count(&self, _document: &[u8]) -> EvalResult<u32> {
        Ok(2)
    }

    async fn rasterize(&self, _document: &[u8], _page: u32) -> EvalResult<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }
}

struct MockNotifier {
    calls: AtomicUsize,
    fail: bool,
}

impl MockNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, _recipient: &str, _subject: &str, _body: &str) -> EvalResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EvalError::request_failed(
                "notify/send",
                std::io::Error::new(std::io::ErrorKind::Other, "通知网关不可用"),
            ));
        }
        Ok(())
    }
}

/// 内存 History Store，记录 append 调用次数
struct MockStore {
    records: Mutex<Vec<HistoryRecord>>,
    append_calls: AtomicUsize,
    fail_append: bool,
}

impl MockStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            append_calls: AtomicUsize::new(0),
            fail_append: false,
        })
    }

    fn failing_append() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            append_calls: AtomicUsize::new(0),
            fail_append: true,
        })
    }

    fn append_count(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for MockStore {
    async fn fetch_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_history(
        &self,
        user_id: &str,
        summary: &AggregateSummary,
    ) -> Result<HistoryRecord, StoreError> {
        if self.fail_append {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let record = HistoryRecord::new(user_id, summary.clone());
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }
}

// ========== 测试脚手架 ==========

fn test_config() -> Config {
    let mut config = Config::default();
    config.max_transient_retries = 1;
    config.retry_backoff_ms = 1;
    config.stage_timeout_secs = 5;
    // 指向不存在的文件 → 固定使用 3 个内置默认人设
    config.personas_file = "no_such_personas.toml".to_string();
    config
}

fn collaborators(judgment: Arc<MockJudgment>, notifier: Arc<MockNotifier>) -> Collaborators {
    Collaborators {
        judgment,
        transcriber: Arc::new(MockTranscriber),
        synthesizer: Arc::new(MockSynthesizer),
        rasterizer: Arc::new(MockRasterizer),
        notifier,
    }
}

fn submission(notify_to: Option<&str>) -> Arc<Submission> {
    Arc::new(Submission::new(
        "user-1",
        b"%PDF-1.4 fake slides".to_vec(),
        b"RIFF....WAVE fake audio".to_vec(),
        "这是转写的文字稿",
        notify_to.map(|s| s.to_string()),
    ))
}

/// 驱动一次完整运行，返回 (运行结果, 收到的全部事件)
async fn run_pipeline(
    config: Config,
    judgment: Arc<MockJudgment>,
    store: Arc<MockStore>,
    notifier: Arc<MockNotifier>,
    submission: Arc<Submission>,
) -> (EvalResult<()>, Vec<StageEvent>) {
    let scheduler = Scheduler::new(
        config.clone(),
        collaborators(judgment, notifier),
        store,
        Arc::new(Semaphore::new(config.max_concurrent_stages)),
    );

    let (stream, mut rx) = ResultStream::channel();
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    let result = scheduler.run(submission, Arc::new(stream)).await;
    let events = collector.await.expect("事件收集任务不应崩溃");
    (result, events)
}

fn events_of<'a>(events: &'a [StageEvent], kind: &str) -> Vec<&'a StageEvent> {
    events.iter().filter(|e| e.stage_kind == kind).collect()
}

fn aggregate_of(events: &[StageEvent]) -> Option<AggregateSummary> {
    events.iter().find_map(|e| match &e.result {
        Some(presentation_evaluator::models::StageResult::Aggregate(summary)) => {
            Some(summary.clone())
        }
        _ => None,
    })
}

// ========== 正常路径 ==========

#[tokio::test]
async fn test_normal_run_streams_one_aggregate_after_dependencies() {
    let judgment = MockJudgment::healthy([5, 5, 4, 5, 4]);
    let store = MockStore::new();
    let notifier = MockNotifier::new();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        store.clone(),
        notifier.clone(),
        submission(Some("user@example.com")),
    )
    .await;

    assert!(result.is_ok());

    // 恰好一条总评事件
    let aggregates = events_of(&events, "aggregate");
    assert_eq!(aggregates.len(), 1);

    // 总评出现在它依赖的每个阶段事件之后
    let aggregate_seq = aggregates[0].sequence_number;
    for kind in ["structure", "speech_rate", "prior_knowledge", "persona", "comparison"] {
        let dependency_events = events_of(&events, kind);
        assert!(!dependency_events.is_empty(), "缺少 {} 事件", kind);
        for event in dependency_events {
            assert!(
                event.sequence_number < aggregate_seq,
                "{} 事件应先于总评",
                kind
            );
        }
    }

    // 3 个内置默认人设 → 3 条人设事件
    assert_eq!(events_of(&events, "persona").len(), 3);

    // 分数恒在 [1,5] 区间
    let summary = aggregate_of(&events).unwrap();
    assert!(summary.scores_in_range());

    // 高分 → 零补救事件；通知恰好一次；持久化恰好一次
    assert!(events_of(&events, "remediation_audio").is_empty());
    assert!(events_of(&events, "remediation_slide").is_empty());
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.append_count(), 1);

    // 最后一条是正常终止标记
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert!(last.error.is_none());
}

#[tokio::test]
async fn test_sequence_numbers_strictly_increase() {
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let (_, events) = run_pipeline(
        test_config(),
        judgment,
        MockStore::new(),
        MockNotifier::new(),
        submission(None),
    )
    .await;

    let mut last_seq = 0;
    for event in &events {
        assert!(event.sequence_number > last_seq);
        last_seq = event.sequence_number;
    }
}

#[tokio::test]
async fn test_no_notification_address_skips_notify() {
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let notifier = MockNotifier::new();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        MockStore::new(),
        notifier.clone(),
        submission(None),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    assert!(events_of(&events, "notify").is_empty());
}

// ========== 条件补救 ==========

#[tokio::test]
async fn test_low_scores_trigger_both_remediations() {
    let judgment = MockJudgment::healthy([2, 2, 4, 4, 4]);
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        MockStore::new(),
        MockNotifier::new(),
        submission(None),
    )
    .await;

    assert!(result.is_ok());
    let audio_events = events_of(&events, "remediation_audio");
    let slide_events = events_of(&events, "remediation_slide");
    assert_eq!(audio_events.len(), 1);
    assert_eq!(slide_events.len(), 1);
    assert!(audio_events[0].result.is_some());
    assert!(slide_events[0].result.is_some());
}

#[tokio::test]
async fn test_low_speech_only_triggers_audio_exemplar() {
    let judgment = MockJudgment::healthy([5, 3, 4, 4, 4]);
    let (_, events) = run_pipeline(
        test_config(),
        judgment,
        MockStore::new(),
        MockNotifier::new(),
        submission(None),
    )
    .await;

    assert_eq!(events_of(&events, "remediation_audio").len(), 1);
    assert!(events_of(&events, "remediation_slide").is_empty());
}

#[tokio::test]
async fn test_threshold_is_read_from_config() {
    // 阈值提到 5 → 即使满分也触发两种补救
    let mut config = test_config();
    config.remediation_threshold = 5;
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let (_, events) = run_pipeline(
        config,
        judgment,
        MockStore::new(),
        MockNotifier::new(),
        submission(None),
    )
    .await;

    assert_eq!(events_of(&events, "remediation_audio").len(), 1);
    assert_eq!(events_of(&events, "remediation_slide").len(), 1);
}

// ========== 失败隔离 ==========

#[tokio::test]
async fn test_prior_knowledge_transient_failure_degrades_not_aborts() {
    // 重试预算 1 次，协作方失败 2 次 → 阶段以瞬时错误落败
    let judgment = MockJudgment::with_pk_failures([5, 5, 4, 5, 4], 2);
    let store = MockStore::new();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        store.clone(),
        MockNotifier::new(),
        submission(None),
    )
    .await;

    // 运行照常完成并持久化
    assert!(result.is_ok());
    assert_eq!(store.append_count(), 1);

    // 前提知识阶段是带 transient 标签的失败事件
    let pk_events = events_of(&events, "prior_knowledge");
    assert_eq!(pk_events.len(), 1);
    let error = pk_events[0].error.as_ref().unwrap();
    assert_eq!(error.tag, "transient");

    // 总评仍然产出，失败维度钉为中性分
    let summary = aggregate_of(&events).unwrap();
    assert_eq!(summary.knowledge_score, 3);
    assert!(summary.scores_in_range());

    // 兄弟阶段不受影响
    assert!(events_of(&events, "structure")[0].result.is_some());
    assert!(events_of(&events, "speech_rate")[0].result.is_some());
}

#[tokio::test]
async fn test_notifier_failure_is_non_fatal() {
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let store = MockStore::new();
    let notifier = MockNotifier::failing();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        store.clone(),
        notifier,
        submission(Some("user@example.com")),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(store.append_count(), 1);

    // 通知失败作为普通失败事件上报，流仍以正常标记收尾
    let notify_events = events_of(&events, "notify");
    assert_eq!(notify_events.len(), 1);
    assert!(notify_events[0].error.is_some());
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert!(last.error.is_none());
}

// ========== 致命路径 ==========

#[tokio::test]
async fn test_aggregate_schema_failure_is_fatal() {
    let judgment = MockJudgment::with_garbage_aggregate();
    let store = MockStore::new();
    let notifier = MockNotifier::new();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        store.clone(),
        notifier.clone(),
        submission(Some("user@example.com")),
    )
    .await;

    assert!(result.is_err());

    // 不落库、不通知
    assert_eq!(store.append_count(), 0);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);

    // 独立阶段的结果调用方照常可见
    assert!(!events_of(&events, "structure").is_empty());

    // 流以唯一一条致命终止事件收尾
    let terminals: Vec<_> = events.iter().filter(|e| e.terminal).collect();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].error.as_ref().unwrap().tag, "fatal");
    assert!(events_of(&events, "aggregate").is_empty());
}

#[tokio::test]
async fn test_persistence_failure_is_terminal_but_not_retracting() {
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let store = MockStore::failing_append();
    let notifier = MockNotifier::new();
    let (result, events) = run_pipeline(
        test_config(),
        judgment,
        store,
        notifier.clone(),
        submission(Some("user@example.com")),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);

    // 总评事件已经推送，不被撤回
    assert_eq!(events_of(&events, "aggregate").len(), 1);

    // 终止事件带 persistence 标签
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.error.as_ref().unwrap().tag, "persistence");
}

// ========== 历史对比 ==========

#[tokio::test]
async fn test_comparison_never_sees_own_write() {
    let store = MockStore::new();

    // 第一次运行：没有历史，对比阶段直接给出"第一次"叙述
    let judgment = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let (result, events) = run_pipeline(
        test_config(),
        judgment.clone(),
        store.clone(),
        MockNotifier::new(),
        submission(None),
    )
    .await;
    assert!(result.is_ok());
    let comparison = events_of(&events, "comparison");
    match comparison[0].result.as_ref().unwrap() {
        presentation_evaluator::models::StageResult::Comparison { narrative } => {
            assert!(narrative.contains("第一次"));
        }
        other => panic!("意外的结果类型: {:?}", other),
    }
    // 第一次运行没有历史 → 对比阶段不调用判断协作方
    assert!(!judgment.prompts().iter().any(|p| p.contains("过往的评估记录")));

    // 第二次运行：对比提示词里恰好出现第一次留下的那一条记录
    let judgment2 = MockJudgment::healthy([5, 5, 5, 5, 5]);
    let (result, _) = run_pipeline(
        test_config(),
        judgment2.clone(),
        store.clone(),
        MockNotifier::new(),
        submission(None),
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(store.append_count(), 2);

    let comparison_prompt = judgment2
        .prompts()
        .into_iter()
        .find(|p| p.contains("过往的评估记录"))
        .expect("第二次运行应调用对比判断");
    // 快照在流水线启动时读取：只包含第一次的记录，不包含本次运行自己的写入
    assert_eq!(comparison_prompt.matches("总评：").count(), 1);
}
