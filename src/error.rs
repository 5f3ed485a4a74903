use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 协议相关错误
    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),
    /// 单元文档（DOM）操作错误
    #[error("文档错误: {0}")]
    Dom(#[from] DomError),
    /// 扩展脚本错误
    #[error("扩展错误: {0}")]
    Extension(#[from] ExtensionError),
    /// 传输通道错误
    #[error("传输错误: {0}")]
    Transport(#[from] TransportError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 协议错误
///
/// 这些错误最终都会被转换为 `vopRuntimeErrorNotification`，不会让播放器崩溃
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Start 命令缺少 unitDefinition
    #[error("缺少 unitDefinition")]
    UnitDefinitionMissing,
    /// 不支持的 unitDefinitionType
    #[error("不支持的 unitDefinitionType: {given}")]
    UnitDefinitionTypeUnsupported { given: String },
    /// 不支持的 unitStateDataType
    #[error("不支持的 unitStateDataType: {given}")]
    UnitStateTypeUnsupported { given: String },
    /// 消息无法解析
    #[error("消息解析失败: {source}")]
    MalformedMessage {
        #[source]
        source: serde_json::Error,
    },
    /// 已知类型的命令字段不合法
    #[error("{message_type} 字段不合法: {source}")]
    MalformedCommand {
        message_type: String,
        session_id: Option<String>,
        #[source]
        source: serde_json::Error,
    },
    /// dataParts.answers 内容无法解析
    #[error("answers 解析失败: {reason}")]
    MalformedAnswers { reason: String },
}

impl ProtocolError {
    /// 获取对应的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::UnitDefinitionMissing => "unit-definition-missing",
            ProtocolError::UnitDefinitionTypeUnsupported { .. } => {
                "unit-definition-type-unsupported"
            }
            ProtocolError::UnitStateTypeUnsupported { .. } => "unit-state-type-unsupported",
            ProtocolError::MalformedMessage { .. } | ProtocolError::MalformedCommand { .. } => {
                "message-malformed"
            }
            ProtocolError::MalformedAnswers { .. } => "unit-state-malformed",
        }
    }
}

/// 单元文档错误
#[derive(Debug, Error)]
pub enum DomError {
    /// 找不到目标元素
    #[error("找不到元素: {target}")]
    ElementNotFound { target: String },
    /// 元素类型不支持该操作
    #[error("元素 {target} 不支持该操作 (需要: {expected})")]
    UnsupportedOperation { target: String, expected: String },
    /// 页码超出范围
    #[error("页码 {index} 超出范围 [0, {max_index}]")]
    PageOutOfRange { index: usize, max_index: usize },
}

/// 扩展脚本错误
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// 扩展函数返回错误
    #[error("扩展 {id} 执行失败: {reason}")]
    Failed { id: String, reason: String },
    /// 扩展函数 panic
    #[error("扩展 {id} 发生 panic")]
    Panicked { id: String },
}

/// 传输通道错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 通道已关闭
    #[error("传输通道已关闭")]
    Closed,
    /// 通道尚未连接
    #[error("传输通道尚未连接")]
    Detached,
    /// 读取失败
    #[error("读取消息失败: {source}")]
    ReadFailed {
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入消息失败: {source}")]
    WriteFailed {
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(ProtocolError::MalformedMessage { source: err })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Transport(TransportError::WriteFailed { source: err })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: err,
        })
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Other(format!("正则表达式编译失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建元素未找到错误
    pub fn element_not_found(target: impl Into<String>) -> Self {
        AppError::Dom(DomError::ElementNotFound {
            target: target.into(),
        })
    }

    /// 创建不支持操作错误
    pub fn unsupported_operation(target: impl Into<String>, expected: impl Into<String>) -> Self {
        AppError::Dom(DomError::UnsupportedOperation {
            target: target.into(),
            expected: expected.into(),
        })
    }

    /// 创建扩展执行失败错误
    pub fn extension_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Extension(ExtensionError::Failed {
            id: id.into(),
            reason: reason.into(),
        })
    }

    /// `vopRuntimeErrorNotification` 使用的错误码
    pub fn runtime_code(&self) -> &'static str {
        match self {
            AppError::Protocol(e) => e.code(),
            AppError::Dom(_) => "unit-render-failed",
            AppError::Extension(_) => "unit-extension-failed",
            AppError::Transport(_) => "transport-failed",
            AppError::Config(_) => "player-config-invalid",
            AppError::Other(_) => "player-error",
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
