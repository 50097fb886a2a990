use axum::{routing::{get, post}, Router};
use holdings_extract::{api, AppConfig, HoldingsExtractor, PatternStore};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置 (校验失败直接退出)
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config.server);

    // 模式库由调用方持久化，这里只读加载
    let pattern_store = match &config.pattern_store_path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            let store = PatternStore::from_json(&json)?;
            info!(
                "Pattern store v{} loaded from {} ({} known values)",
                store.version,
                path,
                store.known_values.len()
            );
            Some(Arc::new(store))
        }
        None => None,
    };

    let state = api::AppState {
        extractor: Arc::new(HoldingsExtractor::new(config.extraction.clone())?),
        pattern_store,
    };

    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/extract", post(api::extract))
        .route("/api/extract/csv", post(api::extract_csv))
        .with_state(state)
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/extract      - holdings as JSON");
    info!("  POST /api/extract/csv  - holdings as CSV");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
