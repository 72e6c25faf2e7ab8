use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::generation::ContentKind;

#[derive(Debug, Serialize, FromRow)]
pub struct StudyOutput {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub pdf_id: Uuid,
    pub kind: ContentKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OutputBrief {
    pub id: Uuid,
    pub kind: ContentKind,
    pub created_at: DateTime<Utc>,
}

/// 带来源PDF信息的内容视图
#[derive(Debug, FromRow)]
pub struct OutputPdfRow {
    pub id: Uuid,
    pub kind: ContentKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub pdf_id: Uuid,
    pub pdf_title: String,
}

#[derive(Debug, Serialize)]
pub struct PdfRef {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct OutputWithPdf {
    pub id: Uuid,
    pub kind: ContentKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub pdf: PdfRef,
}

impl From<OutputPdfRow> for OutputWithPdf {
    fn from(row: OutputPdfRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            content: row.content,
            created_at: row.created_at,
            pdf: PdfRef {
                id: row.pdf_id,
                title: row.pdf_title,
            },
        }
    }
}

/// 重新生成所需的上下文：原内容类型与源文件定位串
#[derive(Debug, FromRow)]
pub struct RegenContext {
    pub kind: ContentKind,
    pub file_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub message: String,
    pub output: StudyOutput,
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub output: OutputWithPdf,
}

#[derive(Debug, Serialize)]
pub struct OutputListResponse {
    pub outputs: Vec<OutputBrief>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl StudyOutput {
    /// (pdf, 类型)唯一性的存在性预检
    pub async fn find_existing(
        pool: &PgPool,
        pdf_id: Uuid,
        kind: ContentKind,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM study_outputs WHERE pdf_id = $1 AND kind = $2",
        )
        .bind(pdf_id)
        .bind(kind)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &PgPool,
        pdf_id: Uuid,
        kind: ContentKind,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, StudyOutput>(
            r#"
            INSERT INTO study_outputs (pdf_id, kind, content)
            VALUES ($1, $2, $3)
            RETURNING id, pdf_id, kind, content, created_at
            "#,
        )
        .bind(pdf_id)
        .bind(kind)
        .bind(content)
        .fetch_one(pool)
        .await
    }

    /// 原地替换正文，行ID不变
    pub async fn update_content(
        pool: &PgPool,
        id: Uuid,
        content: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyOutput>(
            r#"
            UPDATE study_outputs
            SET content = $1
            WHERE id = $2
            RETURNING id, pdf_id, kind, content, created_at
            "#,
        )
        .bind(content)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM study_outputs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn with_pdf(pool: &PgPool, id: Uuid) -> Result<Option<OutputPdfRow>, sqlx::Error> {
        sqlx::query_as::<_, OutputPdfRow>(
            r#"
            SELECT o.id, o.kind, o.content, o.created_at, p.id AS pdf_id, p.title AS pdf_title
            FROM study_outputs o
            JOIN pdf_uploads p ON p.id = o.pdf_id
            WHERE o.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn briefs_for_pdf(
        pool: &PgPool,
        pdf_id: Uuid,
    ) -> Result<Vec<OutputBrief>, sqlx::Error> {
        sqlx::query_as::<_, OutputBrief>(
            r#"
            SELECT id, kind, created_at
            FROM study_outputs
            WHERE pdf_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(pdf_id)
        .fetch_all(pool)
        .await
    }

    pub async fn regen_context(
        pool: &PgPool,
        output_id: Uuid,
    ) -> Result<Option<RegenContext>, sqlx::Error> {
        sqlx::query_as::<_, RegenContext>(
            r#"
            SELECT o.kind, p.file_url
            FROM study_outputs o
            JOIN pdf_uploads p ON p.id = o.pdf_id
            WHERE o.id = $1
            "#,
        )
        .bind(output_id)
        .fetch_optional(pool)
        .await
    }
}

pub async fn pdf_file_url(pool: &PgPool, pdf_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT file_url FROM pdf_uploads WHERE id = $1")
        .bind(pdf_id)
        .fetch_optional(pool)
        .await
}
