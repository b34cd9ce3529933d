use anyhow::Result;
use presentation_evaluator::config::Config;
use presentation_evaluator::utils::logging;
use presentation_evaluator::App;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
