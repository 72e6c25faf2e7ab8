use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::generation::ContentKind;
use crate::utils::double_option;

#[derive(Debug, Serialize, FromRow)]
pub struct StudyPlan {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notify_by_email: bool,
    pub notify_by_whatsapp: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PlanTask {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub plan_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub related_output_id: Option<Uuid>,
}

/// 计划列表里附带的任务概要
#[derive(Debug, Serialize, FromRow)]
pub struct TaskBrief {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub plan_id: Uuid,
    pub title: String,
    pub due_date: NaiveDate,
    pub completed: bool,
}

/// 计划详情里的任务行，LEFT JOIN出关联的生成内容
#[derive(Debug, FromRow)]
pub struct TaskOutputRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub related_output_id: Option<Uuid>,
    pub output_kind: Option<ContentKind>,
    pub output_content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskOutputRef {
    pub id: Uuid,
    pub kind: ContentKind,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TaskWithOutput {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub related_output_id: Option<Uuid>,
    pub study_output: Option<TaskOutputRef>,
}

impl From<TaskOutputRow> for TaskWithOutput {
    fn from(row: TaskOutputRow) -> Self {
        let study_output = match (row.related_output_id, row.output_kind, row.output_content) {
            (Some(id), Some(kind), Some(content)) => Some(TaskOutputRef { id, kind, content }),
            _ => None,
        };
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            completed: row.completed,
            related_output_id: row.related_output_id,
            study_output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanWithTasks {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notify_by_email: bool,
    pub notify_by_whatsapp: bool,
    pub created_at: DateTime<Utc>,
    pub plan_tasks: Vec<TaskBrief>,
}

#[derive(Debug, Serialize)]
pub struct PlanDetail {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notify_by_email: bool,
    pub notify_by_whatsapp: bool,
    pub created_at: DateTime<Utc>,
    pub plan_tasks: Vec<TaskWithOutput>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ProgressRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub output_id: Uuid,
    pub interaction_type: String,
    pub score: Option<f64>,
    pub interacted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopContentEntry {
    pub output_id: Uuid,
    pub kind: ContentKind,
    pub pdf_title: String,
    pub interacted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub interaction_type: String,
    pub score: Option<f64>,
    pub interacted_at: DateTime<Utc>,
    pub kind: ContentKind,
    pub pdf_title: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notify_by_email: Option<bool>,
    pub notify_by_whatsapp: Option<bool>,
}

/// 稀疏更新：缺失的字段保持不变，description显式传null表示清空
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notify_by_email: Option<bool>,
    pub notify_by_whatsapp: Option<bool>,
}

impl UpdatePlanRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.notify_by_email.is_none()
            && self.notify_by_whatsapp.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub related_output_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub related_output_id: Option<Option<Uuid>>,
}

impl UpdateTaskRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.related_output_id.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProgressRequest {
    pub output_id: Option<Uuid>,
    pub interaction_type: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub message: String,
    pub plan: StudyPlan,
}

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub plans: Vec<PlanWithTasks>,
}

#[derive(Debug, Serialize)]
pub struct PlanDetailResponse {
    pub plan: PlanDetail,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub message: String,
    pub task: PlanTask,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub message: String,
    pub progress: ProgressRecord,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_interactions: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub top_content: Vec<TopContentEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl StudyPlan {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        req: &CreatePlanRequest,
        title: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            INSERT INTO study_plans
                (user_id, title, description, start_date, end_date, notify_by_email, notify_by_whatsapp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, title, description, start_date, end_date,
                      notify_by_email, notify_by_whatsapp, created_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(req.description.as_deref())
        .bind(start_date)
        .bind(end_date)
        .bind(req.notify_by_email.unwrap_or(false))
        .bind(req.notify_by_whatsapp.unwrap_or(false))
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            SELECT id, user_id, title, description, start_date, end_date,
                   notify_by_email, notify_by_whatsapp, created_at
            FROM study_plans
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            SELECT id, user_id, title, description, start_date, end_date,
                   notify_by_email, notify_by_whatsapp, created_at
            FROM study_plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 只拼接请求里出现的字段，缺失字段不进SET子句
    pub async fn sparse_update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdatePlanRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE study_plans SET ");
        {
            let mut sep = qb.separated(", ");
            if let Some(title) = &req.title {
                sep.push("title = ").push_bind_unseparated(title);
            }
            if let Some(description) = &req.description {
                sep.push("description = ")
                    .push_bind_unseparated(description.as_deref());
            }
            if let Some(start_date) = req.start_date {
                sep.push("start_date = ").push_bind_unseparated(start_date);
            }
            if let Some(end_date) = req.end_date {
                sep.push("end_date = ").push_bind_unseparated(end_date);
            }
            if let Some(notify_by_email) = req.notify_by_email {
                sep.push("notify_by_email = ")
                    .push_bind_unseparated(notify_by_email);
            }
            if let Some(notify_by_whatsapp) = req.notify_by_whatsapp {
                sep.push("notify_by_whatsapp = ")
                    .push_bind_unseparated(notify_by_whatsapp);
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(
            " RETURNING id, user_id, title, description, start_date, end_date, \
             notify_by_email, notify_by_whatsapp, created_at",
        );

        qb.build_query_as::<StudyPlan>().fetch_optional(pool).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM study_plans WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}

impl PlanTask {
    pub async fn create(
        pool: &PgPool,
        plan_id: Uuid,
        title: &str,
        description: Option<&str>,
        due_date: NaiveDate,
        related_output_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PlanTask>(
            r#"
            INSERT INTO plan_tasks (plan_id, title, description, due_date, related_output_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, plan_id, title, description, due_date, completed, related_output_id
            "#,
        )
        .bind(plan_id)
        .bind(title)
        .bind(description)
        .bind(due_date)
        .bind(related_output_id)
        .fetch_one(pool)
        .await
    }

    pub async fn sparse_update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateTaskRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE plan_tasks SET ");
        {
            let mut sep = qb.separated(", ");
            if let Some(title) = &req.title {
                sep.push("title = ").push_bind_unseparated(title);
            }
            if let Some(description) = &req.description {
                sep.push("description = ")
                    .push_bind_unseparated(description.as_deref());
            }
            if let Some(due_date) = req.due_date {
                sep.push("due_date = ").push_bind_unseparated(due_date);
            }
            if let Some(completed) = req.completed {
                sep.push("completed = ").push_bind_unseparated(completed);
            }
            if let Some(related_output_id) = &req.related_output_id {
                sep.push("related_output_id = ")
                    .push_bind_unseparated(*related_output_id);
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(
            " RETURNING id, plan_id, title, description, due_date, completed, related_output_id",
        );

        qb.build_query_as::<PlanTask>().fetch_optional(pool).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM plan_tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn briefs_for_plans(
        pool: &PgPool,
        plan_ids: &[Uuid],
    ) -> Result<Vec<TaskBrief>, sqlx::Error> {
        sqlx::query_as::<_, TaskBrief>(
            r#"
            SELECT id, plan_id, title, due_date, completed
            FROM plan_tasks
            WHERE plan_id = ANY($1)
            ORDER BY due_date
            "#,
        )
        .bind(plan_ids)
        .fetch_all(pool)
        .await
    }

    pub async fn detail_for_plan(
        pool: &PgPool,
        plan_id: Uuid,
    ) -> Result<Vec<TaskOutputRow>, sqlx::Error> {
        sqlx::query_as::<_, TaskOutputRow>(
            r#"
            SELECT t.id, t.title, t.description, t.due_date, t.completed, t.related_output_id,
                   o.kind AS output_kind, o.content AS output_content
            FROM plan_tasks t
            LEFT JOIN study_outputs o ON o.id = t.related_output_id
            WHERE t.plan_id = $1
            ORDER BY t.due_date
            "#,
        )
        .bind(plan_id)
        .fetch_all(pool)
        .await
    }
}

impl ProgressRecord {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        output_id: Uuid,
        interaction_type: &str,
        score: Option<f64>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProgressRecord>(
            r#"
            INSERT INTO progress_tracking (user_id, output_id, interaction_type, score)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, output_id, interaction_type, score, interacted_at
            "#,
        )
        .bind(user_id)
        .bind(output_id)
        .bind(interaction_type)
        .bind(score)
        .fetch_one(pool)
        .await
    }

    pub async fn total_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM progress_tracking WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn task_counts(pool: &PgPool, user_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*) FILTER (WHERE t.completed),
                   COUNT(*) FILTER (WHERE NOT t.completed)
            FROM plan_tasks t
            JOIN study_plans p ON p.id = t.plan_id
            WHERE p.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn top_content(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<TopContentEntry>, sqlx::Error> {
        sqlx::query_as::<_, TopContentEntry>(
            r#"
            SELECT pr.output_id, o.kind, p.title AS pdf_title, pr.interacted_at
            FROM progress_tracking pr
            JOIN study_outputs o ON o.id = pr.output_id
            JOIN pdf_uploads p ON p.id = o.pdf_id
            WHERE pr.user_id = $1
            ORDER BY pr.interacted_at DESC
            LIMIT 10
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn history(pool: &PgPool, user_id: Uuid) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT pr.id, pr.interaction_type, pr.score, pr.interacted_at,
                   o.kind, p.title AS pdf_title
            FROM progress_tracking pr
            JOIN study_outputs o ON o.id = pr.output_id
            JOIN pdf_uploads p ON p.id = o.pdf_id
            WHERE pr.user_id = $1
            ORDER BY pr.interacted_at DESC
            LIMIT 50
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_plan_request_empty_detection() {
        let empty: UpdatePlanRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());

        let title_only: UpdatePlanRequest = serde_json::from_str(r#"{"title": "X"}"#).unwrap();
        assert!(!title_only.is_empty());
        assert_eq!(title_only.title.as_deref(), Some("X"));
        assert!(title_only.start_date.is_none());
        assert!(title_only.notify_by_email.is_none());

        // 显式null清空描述，与缺失不同
        let clear_desc: UpdatePlanRequest =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert!(!clear_desc.is_empty());
        assert_eq!(clear_desc.description, Some(None));
    }

    #[test]
    fn update_task_request_empty_detection() {
        let empty: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());

        let done: UpdateTaskRequest = serde_json::from_str(r#"{"completed": true}"#).unwrap();
        assert!(!done.is_empty());
        assert_eq!(done.completed, Some(true));
        assert!(done.related_output_id.is_none());

        let unlink: UpdateTaskRequest =
            serde_json::from_str(r#"{"related_output_id": null}"#).unwrap();
        assert_eq!(unlink.related_output_id, Some(None));
    }
}
