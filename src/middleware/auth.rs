use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, error::AppError, utils::verify_token};

/// 通过认证后挂到请求上的用户信息，不包含口令哈希
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub education_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::Unauthorized("缺少访问令牌".to_string()))?;

    let claims = verify_token(bearer.token(), &state.config)
        .map_err(|_| AppError::Unauthorized("访问令牌无效或已过期".to_string()))?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("访问令牌无效或已过期".to_string()))?;

    let user = sqlx::query_as::<_, AuthUser>(
        "SELECT id, name, email, role, education_level, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("用户不存在".to_string()))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
