use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::generation::ContentKind;

#[derive(Debug, Serialize, FromRow)]
pub struct PdfUpload {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 列表视图里附带的内容概要，不含正文
#[derive(Debug, Serialize, FromRow)]
pub struct OutputBrief {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub pdf_id: Uuid,
    pub kind: ContentKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OutputFull {
    pub id: Uuid,
    pub kind: ContentKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PdfWithOutputs {
    pub id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
    pub study_outputs: Vec<OutputBrief>,
}

#[derive(Debug, Serialize)]
pub struct PdfDetail {
    pub id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
    pub study_outputs: Vec<OutputFull>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub pdf: PdfUpload,
}

#[derive(Debug, Serialize)]
pub struct PdfListResponse {
    pub pdfs: Vec<PdfWithOutputs>,
}

#[derive(Debug, Serialize)]
pub struct PdfDetailResponse {
    pub pdf: PdfDetail,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl PdfUpload {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        file_name: &str,
        file_url: &str,
        title: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PdfUpload>(
            r#"
            INSERT INTO pdf_uploads (user_id, file_name, file_url, title)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, file_name, file_url, title, uploaded_at
            "#,
        )
        .bind(user_id)
        .bind(file_name)
        .bind(file_url)
        .bind(title)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PdfUpload>(
            r#"
            SELECT id, user_id, file_name, file_url, title, uploaded_at
            FROM pdf_uploads
            WHERE user_id = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PdfUpload>(
            r#"
            SELECT id, user_id, file_name, file_url, title, uploaded_at
            FROM pdf_uploads
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_title(
        pool: &PgPool,
        id: Uuid,
        title: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PdfUpload>(
            r#"
            UPDATE pdf_uploads
            SET title = $1
            WHERE id = $2
            RETURNING id, user_id, file_name, file_url, title, uploaded_at
            "#,
        )
        .bind(title)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pdf_uploads WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// 按存储定位串校验文件属主，用于文件下载接口
    pub async fn locator_owned(
        pool: &PgPool,
        user_id: Uuid,
        file_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let found = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM pdf_uploads WHERE file_url = $1 AND user_id = $2",
        )
        .bind(file_url)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(found.is_some())
    }
}

impl OutputBrief {
    pub async fn list_for_pdfs(pool: &PgPool, pdf_ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OutputBrief>(
            r#"
            SELECT id, pdf_id, kind, created_at
            FROM study_outputs
            WHERE pdf_id = ANY($1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(pdf_ids)
        .fetch_all(pool)
        .await
    }
}

impl OutputFull {
    pub async fn list_for_pdf(pool: &PgPool, pdf_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OutputFull>(
            r#"
            SELECT id, kind, content, created_at
            FROM study_outputs
            WHERE pdf_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(pdf_id)
        .fetch_all(pool)
        .await
    }
}
