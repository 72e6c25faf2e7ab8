use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    middleware::AuthUser,
    utils::{DUMMY_HASH, generate_token, hash_password, verify_password},
};

use super::model::{AuthResponse, LoginRequest, ProfileResponse, RegisterRequest, UserProfile};

// 未知邮箱与密码错误共用同一条提示，不暴露账号是否存在
const LOGIN_FAILED: &str = "邮箱或密码错误";

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(name), Some(email), Some(password), Some(role)) =
        (req.name, req.email, req.password, req.role)
    else {
        return Err(AppError::Validation("缺少必填字段".to_string()));
    };

    let password_hash = hash_password(&password)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;

    // 重复邮箱交给唯一约束兜底，并发注册也只会得到400
    let user = match UserProfile::create(
        &state.pool,
        &name,
        &email,
        &password_hash,
        &role,
        req.education_level.as_deref(),
    )
    .await
    {
        Ok(user) => user,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AppError::Validation("该邮箱已注册".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let token = generate_token(user.id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "注册成功".to_string(),
            user,
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(AppError::Validation("邮箱和密码为必填项".to_string()));
    };

    let Some(row) = UserProfile::find_for_login(&state.pool, &email).await? else {
        // 用户不存在时同样跑一次校验，避免时间差泄露账号存在与否
        let _ = verify_password(&password, DUMMY_HASH);
        return Err(AppError::Unauthorized(LOGIN_FAILED.to_string()));
    };

    let valid = verify_password(&password, &row.password_hash)
        .map_err(|e| AppError::Internal(format!("failed to verify password: {}", e)))?;
    if !valid {
        return Err(AppError::Unauthorized(LOGIN_FAILED.to_string()));
    }

    let token = generate_token(row.id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            message: "登录成功".to_string(),
            user: row.into(),
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn profile(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    (StatusCode::OK, Json(ProfileResponse { user }))
}
