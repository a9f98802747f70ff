//! OPC UA → MQTT / HTTP / 终端 数据桥接进程。

mod bridge;
mod handlers;
mod middleware;
mod routes;
mod terminal;

use bridge::Bridge;
use bridge_config::AppConfig;
use bridge_ingest::ValueCache;
use bridge_telemetry::init_tracing;
use tracing::{error, info};

/// HTTP 查询共享状态。
#[derive(Clone)]
pub struct AppState {
    pub cache: ValueCache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志
    init_tracing();
    // 从环境变量加载运行配置与点位文件
    let config = AppConfig::from_env()?;

    let bridge = match Bridge::start(&config).await {
        Ok(bridge) => bridge,
        Err(err) => {
            error!(target: "bridge.app", error = %err, "startup_failed");
            return Err(err.into());
        }
    };
    info!(target: "bridge.app", "bridge_running");

    let signal = tokio::signal::ctrl_c().await;
    info!(target: "bridge.app", "shutdown_requested");
    bridge.shutdown().await;
    signal?;
    Ok(())
}
