use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{Extension, Json, Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::AuthUser,
    ownership::{ResourceFamily, require_owned},
};

use super::model::{
    MessageResponse, OutputBrief, OutputFull, PdfDetail, PdfDetailResponse, PdfListResponse,
    PdfUpload, PdfWithOutputs, UpdateTitleRequest, UploadResponse,
};

#[axum::debug_handler]
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file_name: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("无法解析上传表单：{}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("pdf") => {
                file_name = field.file_name().map(|n| n.to_string());
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("读取文件失败：{}", e)))?
                        .to_vec(),
                );
            }
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("读取字段失败：{}", e)))?,
                );
            }
            _ => {}
        }
    }

    let Some(data) = data else {
        return Err(AppError::Validation("未提供任何文件".to_string()));
    };
    let file_name = file_name.unwrap_or_else(|| "document.pdf".to_string());

    if !file_name.to_lowercase().ends_with(".pdf") {
        return Err(AppError::Validation("只允许上传PDF文件".to_string()));
    }

    let stored_name = format!("pdf-{}.pdf", Uuid::new_v4());
    let file_path = PathBuf::from(&state.config.upload_dir).join(&stored_name);
    tokio::fs::write(&file_path, &data).await?;

    let file_url = format!("/uploads/{}", stored_name);
    let title = title.filter(|t| !t.is_empty()).unwrap_or_else(|| file_name.clone());

    let pdf = match PdfUpload::create(&state.pool, user.id, &file_name, &file_url, &title).await {
        Ok(pdf) => pdf,
        Err(e) => {
            // 入库失败则回收刚写入的文件
            if let Err(fe) = tokio::fs::remove_file(&file_path).await {
                tracing::warn!("Failed to remove orphaned upload {:?}: {}", file_path, fe);
            }
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "PDF上传成功".to_string(),
            pdf,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_my_pdfs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let pdfs = PdfUpload::list_for_user(&state.pool, user.id).await?;
    let pdf_ids: Vec<Uuid> = pdfs.iter().map(|p| p.id).collect();

    let mut grouped: HashMap<Uuid, Vec<OutputBrief>> = HashMap::new();
    for output in OutputBrief::list_for_pdfs(&state.pool, &pdf_ids).await? {
        grouped.entry(output.pdf_id).or_default().push(output);
    }

    let pdfs = pdfs
        .into_iter()
        .map(|pdf| PdfWithOutputs {
            study_outputs: grouped.remove(&pdf.id).unwrap_or_default(),
            id: pdf.id,
            file_name: pdf.file_name,
            file_url: pdf.file_url,
            title: pdf.title,
            uploaded_at: pdf.uploaded_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(PdfListResponse { pdfs })))
}

#[axum::debug_handler]
pub async fn get_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Pdf, id, user.id).await?;

    let pdf = PdfUpload::find(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Pdf.label()))?;
    let study_outputs = OutputFull::list_for_pdf(&state.pool, id).await?;

    Ok((
        StatusCode::OK,
        Json(PdfDetailResponse {
            pdf: PdfDetail {
                id: pdf.id,
                file_name: pdf.file_name,
                file_url: pdf.file_url,
                title: pdf.title,
                uploaded_at: pdf.uploaded_at,
                study_outputs,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_title(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTitleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(title) = req.title.filter(|t| !t.is_empty()) else {
        return Err(AppError::Validation("标题为必填项".to_string()));
    };

    require_owned(&state.pool, ResourceFamily::Pdf, id, user.id).await?;

    let pdf = PdfUpload::update_title(&state.pool, id, &title)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Pdf.label()))?;

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            message: "标题更新成功".to_string(),
            pdf,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Pdf, id, user.id).await?;

    let pdf = PdfUpload::find(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Pdf.label()))?;

    // 先删行（级联删除生成内容），行删除成功后才动文件
    PdfUpload::delete(&state.pool, id).await?;

    if let Some(stored_name) = pdf.file_url.strip_prefix("/uploads/") {
        let file_path = PathBuf::from(&state.config.upload_dir).join(stored_name);
        if let Err(e) = tokio::fs::remove_file(&file_path).await {
            // 数据库记录为准，文件删除失败只记日志
            tracing::warn!("Failed to remove file {:?}: {}", file_path, e);
        }
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "PDF删除成功".to_string(),
        }),
    ))
}

#[axum::debug_handler]
pub async fn serve_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // 拒绝路径穿越
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(AppError::NotFound("文件"));
    }

    let file_url = format!("/uploads/{}", filename);
    if !PdfUpload::locator_owned(&state.pool, user.id, &file_url).await? {
        return Err(AppError::NotFound("文件"));
    }

    // 流式下发，避免整个文件驻留内存
    let file_path = FsPath::new(&state.config.upload_dir).join(&filename);
    let file = tokio::fs::File::open(&file_path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/pdf")],
        body,
    ))
}
