use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    generation::ContentKind,
    middleware::AuthUser,
    ownership::{ResourceFamily, require_owned},
};

use super::model::{
    ContentResponse, GenerateRequest, MessageResponse, OutputListResponse, OutputResponse,
    StudyOutput, pdf_file_url,
};

const DEFAULT_EDUCATION_LEVEL: &str = "大学";

#[axum::debug_handler]
pub async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pdf_id): Path<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(kind_raw) = req.kind else {
        return Err(AppError::Validation("内容类型为必填项".to_string()));
    };
    let Some(kind) = ContentKind::parse(&kind_raw) else {
        return Err(AppError::Validation(format!(
            "无效的内容类型，可选值：{}",
            ContentKind::valid_values()
        )));
    };

    require_owned(&state.pool, ResourceFamily::Pdf, pdf_id, user.id).await?;

    // 同一指纹只允许一个在途请求，permit随handler结束释放
    let _permit = state
        .generation_locks
        .try_acquire(pdf_id, kind)
        .ok_or_else(|| AppError::Conflict {
            message: "相同的生成请求正在处理中，请稍后再试".to_string(),
            output_id: None,
        })?;

    if let Some(existing) = StudyOutput::find_existing(&state.pool, pdf_id, kind).await? {
        return Err(AppError::Conflict {
            message: "该PDF已存在此类型的内容".to_string(),
            output_id: Some(existing),
        });
    }

    let file_url = pdf_file_url(&state.pool, pdf_id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Pdf.label()))?;
    let text = state.extractor.extract(&file_url)?;

    let education_level = user
        .education_level
        .as_deref()
        .unwrap_or(DEFAULT_EDUCATION_LEVEL);
    let content = state
        .generator
        .generate(kind, &text, education_level)
        .await?;

    let output = StudyOutput::create(&state.pool, pdf_id, kind, &content).await?;

    Ok((
        StatusCode::CREATED,
        Json(OutputResponse {
            message: "学习内容生成成功".to_string(),
            output,
        }),
    ))
}

#[axum::debug_handler]
pub async fn get_content(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(output_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Output, output_id, user.id).await?;

    let row = StudyOutput::with_pdf(&state.pool, output_id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Output.label()))?;

    Ok((
        StatusCode::OK,
        Json(ContentResponse { output: row.into() }),
    ))
}

#[axum::debug_handler]
pub async fn list_for_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pdf_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Pdf, pdf_id, user.id).await?;

    let outputs = StudyOutput::briefs_for_pdf(&state.pool, pdf_id).await?;

    Ok((StatusCode::OK, Json(OutputListResponse { outputs })))
}

#[axum::debug_handler]
pub async fn regenerate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(output_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Output, output_id, user.id).await?;

    let ctx = StudyOutput::regen_context(&state.pool, output_id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Output.label()))?;

    let text = state.extractor.extract(&ctx.file_url)?;
    let education_level = user
        .education_level
        .as_deref()
        .unwrap_or(DEFAULT_EDUCATION_LEVEL);
    let content = state
        .generator
        .generate(ctx.kind, &text, education_level)
        .await?;

    let output = StudyOutput::update_content(&state.pool, output_id, &content)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Output.label()))?;

    Ok((
        StatusCode::OK,
        Json(OutputResponse {
            message: "学习内容重新生成成功".to_string(),
            output,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_content(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(output_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Output, output_id, user.id).await?;

    StudyOutput::delete(&state.pool, output_id).await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "学习内容删除成功".to_string(),
        }),
    ))
}
