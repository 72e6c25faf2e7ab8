use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    /// 请求字段缺失或无效
    Validation(String),
    /// 凭证缺失或无效
    Unauthorized(String),
    /// 资源不存在，或者属主不是当前用户（两者统一返回404）
    NotFound(&'static str),
    /// 重复的生成请求，可能携带已存在的内容ID
    Conflict {
        message: String,
        output_id: Option<Uuid>,
    },
    /// 触发限流
    RateLimited(String),
    /// 存储、邮件或生成服务等上游依赖失败
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_id: Option<Uuid>,
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "{}", msg),
            AppError::Unauthorized(msg) => write!(f, "{}", msg),
            AppError::NotFound(what) => write!(f, "{}不存在", what),
            AppError::Conflict { message, .. } => write!(f, "{}", message),
            AppError::RateLimited(msg) => write!(f, "{}", msg),
            AppError::Internal(detail) => write!(f, "{}", detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, output_id) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{}不存在", what), None),
            AppError::Conflict { message, output_id } => {
                (StatusCode::BAD_REQUEST, message, output_id)
            }
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg, None),
            AppError::Internal(detail) => {
                // 细节只记日志，客户端只看到统一的提示
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "服务器内部错误".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse { error, output_id });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(format!("database error: {}", e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(format!("io error: {}", e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Internal(format!("upstream request error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let cases = [
            (
                AppError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Unauthorized("no".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::NotFound("PDF"), StatusCode::NOT_FOUND),
            (
                AppError::Conflict {
                    message: "dup".into(),
                    output_id: Some(Uuid::new_v4()),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::RateLimited("slow down".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
