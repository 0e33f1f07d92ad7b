use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::response::{ApiResponse, ResponseCode};

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未认证: {0}")]
    Unauthorized(String),

    #[error("资源不存在: {resource}")]
    NotFound { resource: String },

    #[error("文件未找到: {path}")]
    FileNotFound { path: String },

    #[error("外部工具错误: {0}")]
    ExternalTool(String),

    #[error("服务不可用: {0}")]
    ServiceUnavailable(String),

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            AppError::Database(_) => (ResponseCode::DATABASE_ERROR, self.to_string()),
            AppError::Serialization(_) => {
                (ResponseCode::INTERNAL_ERROR, "数据序列化错误".to_string())
            }
            AppError::Io(_) => (ResponseCode::INTERNAL_ERROR, "文件IO错误".to_string()),
            AppError::Config(_) => (ResponseCode::INTERNAL_ERROR, "配置错误".to_string()),
            AppError::Validation(msg) => (ResponseCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(msg) => (ResponseCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (ResponseCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound { resource } => (ResponseCode::NOT_FOUND, resource.clone()),
            AppError::FileNotFound { .. } => {
                (ResponseCode::NOT_FOUND, "File not found".to_string())
            }
            AppError::ExternalTool(_) => (ResponseCode::EXTERNAL_TOOL_ERROR, self.to_string()),
            AppError::ServiceUnavailable(_) => {
                (ResponseCode::SERVICE_UNAVAILABLE, "服务不可用".to_string())
            }
            AppError::Internal(_) => (ResponseCode::INTERNAL_ERROR, "服务器内部错误".to_string()),
        };

        // 客户端错误只记警告，其余按错误记录
        if code < ResponseCode::INTERNAL_ERROR {
            tracing::warn!("请求被拒绝: {}", self);
        } else {
            tracing::error!("应用错误: {}", self);
        }

        ApiResponse::<()>::error(code, message).into_response()
    }
}

/// 应用程序Result类型别名
pub type AppResult<T> = Result<T, AppError>;

/// 错误构造辅助函数
impl AppError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    pub fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn file_not_found<T: Into<String>>(path: T) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn external_tool<T: Into<String>>(msg: T) -> Self {
        Self::ExternalTool(msg.into())
    }

    pub fn service_unavailable<T: Into<String>>(msg: T) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 存储层错误分类：连接类故障为 503，其余保留 `sqlx::Error` 为数据库错误
    pub fn store(context: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                Self::service_unavailable(format!("{}: {}", context, err))
            }
            err => {
                tracing::error!("{}: {}", context, err);
                Self::Database(err)
            }
        }
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
