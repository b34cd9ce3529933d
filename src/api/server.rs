//! HTTP 服务装配
//!
//! 装配路由与应用上下文并启动 axum 服务。协作方、存储与工作池在
//! 这里构建一次，作为显式依赖注入调度器。

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use crate::clients::{Collaborators, Transcriber};
use crate::config::Config;
use crate::orchestrator::Scheduler;
use crate::store::SqliteHistoryStore;

/// 上传体大小上限（幻灯片 + 录音）
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// 传给各 handler 的共享应用上下文
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<Scheduler>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// 应用主结构
pub struct App {
    config: Config,
    ctx: AppContext,
}

impl App {
    /// 初始化应用：连接数据库、构建协作方与调度器
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let collaborators = Collaborators::from_config(&config);
        let store = Arc::new(SqliteHistoryStore::connect(&config.database_url).await?);
        let worker_pool = Arc::new(Semaphore::new(config.max_concurrent_stages));

        let scheduler = Arc::new(Scheduler::new(
            config.clone(),
            collaborators.clone(),
            store,
            worker_pool,
        ));

        Ok(Self {
            ctx: AppContext {
                scheduler,
                transcriber: collaborators.transcriber.clone(),
            },
            config,
        })
    }

    /// 启动 HTTP 服务
    pub async fn run(self) -> Result<()> {
        let app = Router::new()
            .route("/health", get(super::evaluate::health))
            .route("/evaluate", post(super::evaluate::evaluate))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .with_state(self.ctx);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_addr).await?;
        info!("🚀 服务已启动，监听 {}", self.config.bind_addr);
        axum::serve(listener, app).await?;

        Ok(())
    }
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 发表评估服务启动");
    info!("📊 阶段并发上限: {}", config.max_concurrent_stages);
    info!("⏱️ 阶段超时: {} 秒", config.stage_timeout_secs);
    info!("📋 补救阈值: <= {}", config.remediation_threshold);
    info!("{}", "=".repeat(60));
}
