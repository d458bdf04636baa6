//! 翻译管线统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use thiserror::Error;

/// 翻译管线错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 翻译服务错误
    #[error("翻译服务错误: {0}")]
    Provider(String),

    /// 速率限制错误
    #[error("请求速率过快: {0}")]
    RateLimited(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Storage(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 可重试错误由下一次页面扫描或缓存未命中自然触发重试，
    /// 管线本身不在同一轮处理内重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Network(_) => true,
            TranslationError::Provider(_) => true,
            TranslationError::Timeout(_) => true,
            TranslationError::RateLimited(_) => false, // 需要等待窗口滑动
            TranslationError::Storage(_) => true,
            TranslationError::Config(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::Serialization(_) => false,
            TranslationError::Parse(_) => false,
            TranslationError::Internal(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::Config(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::Network(_) => ErrorSeverity::Warning,
            TranslationError::Provider(_) => ErrorSeverity::Warning,
            TranslationError::RateLimited(_) => ErrorSeverity::Warning,
            TranslationError::Timeout(_) => ErrorSeverity::Warning,
            TranslationError::Storage(_) => ErrorSeverity::Warning,
            TranslationError::Serialization(_) => ErrorSeverity::Error,
            TranslationError::Parse(_) => ErrorSeverity::Error,
            TranslationError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::Config(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::Network(_) => ErrorCategory::Network,
            TranslationError::Provider(_) => ErrorCategory::Service,
            TranslationError::RateLimited(_) => ErrorCategory::RateLimit,
            TranslationError::Timeout(_) => ErrorCategory::Timeout,
            TranslationError::Storage(_) => ErrorCategory::Storage,
            TranslationError::Serialization(_) => ErrorCategory::Serialization,
            TranslationError::Parse(_) => ErrorCategory::Parsing,
            TranslationError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Network,
    Service,
    RateLimit,
    Timeout,
    Storage,
    Serialization,
    Parsing,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::Storage(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::Parse(format!("TOML解析错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::Timeout(format!("请求超时: {}", error))
        } else {
            TranslationError::Network(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;
