use crate::config::ExtractionConfig;
use crate::export::write_decisions_csv;
use crate::models::{ExtractionResult, PatternStore};
use crate::service::{DocumentInput, HoldingsExtractor};
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 共享状态：默认提取服务 + 只读模式库
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<HoldingsExtractor>,
    pub pattern_store: Option<Arc<PatternStore>>,
}

/// 请求体: 文档文本 + 可选表格/参考合计/配置覆盖
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(flatten)]
    pub document: DocumentInput,
    #[serde(default)]
    pub config: Option<ExtractionConfig>,
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub message: String,
    pub result: Option<ExtractionResult>,
}

impl ExtractResponse {
    fn failure(status: StatusCode, message: String) -> Response {
        let response = ExtractResponse {
            success: false,
            message,
            result: None,
        };
        (status, Json(response)).into_response()
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 提取接口 (JSON)
pub async fn extract(State(state): State<AppState>, Json(req): Json<ExtractRequest>) -> Response {
    match run_extraction(state, req).await {
        Ok(result) => {
            let response = ExtractResponse {
                success: true,
                message: format!(
                    "Extracted {} holdings ({} unresolved)",
                    result.decisions.len(),
                    result.unresolved_entities.len()
                ),
                result: Some(result),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err((status, message)) => ExtractResponse::failure(status, message),
    }
}

/// 提取接口 (CSV)
pub async fn extract_csv(State(state): State<AppState>, Json(req): Json<ExtractRequest>) -> Response {
    let result = match run_extraction(state, req).await {
        Ok(result) => result,
        Err((status, message)) => return ExtractResponse::failure(status, message),
    };

    let mut buf = Vec::new();
    if let Err(e) = write_decisions_csv(&mut buf, &result.decisions) {
        return ExtractResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e));
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/csv; charset=utf-8")], buf).into_response()
}

/// 配置覆盖时临时构建提取服务；CPU 密集部分放到阻塞线程池
async fn run_extraction(
    state: AppState,
    req: ExtractRequest,
) -> Result<ExtractionResult, (StatusCode, String)> {
    let extractor = match req.config {
        Some(config) => Arc::new(
            HoldingsExtractor::new(config).map_err(|e| (StatusCode::BAD_REQUEST, format!("Error: {}", e)))?,
        ),
        None => state.extractor.clone(),
    };
    let store = state.pattern_store.clone();
    let document = req.document;

    tokio::task::spawn_blocking(move || extractor.extract(&document, store.as_deref()))
        .await
        .map_err(|e| {
            tracing::error!("extraction task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        })
}
