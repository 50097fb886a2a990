use thiserror::Error;

/// 统一结果类型
pub type Result<T> = std::result::Result<T, ExtractError>;

/// 提取流程中调用方可见的错误
///
/// 文档内容本身永远不会导致失败：解析失败、无可信候选、币种格式不明确、
/// 找不到合计都只会降低结果数量或置信度。只有配置错误会在处理前直接返回。
#[derive(Error, Debug)]
pub enum ExtractError {
    /// 配置校验失败 (例如窗口半径为 0、金额上下限颠倒)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 证券代码正则无法编译
    #[error("Invalid identifier pattern: {0}")]
    IdentifierPattern(#[from] regex::Error),

    /// 模式库 JSON 读写失败
    #[error("Pattern store error: {0}")]
    PatternStore(#[from] serde_json::Error),

    /// 配置文件/环境变量加载失败
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}
