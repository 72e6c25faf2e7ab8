use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub method: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent: bool,
}

/// 列表视图的行，JOIN出任务概要
#[derive(Debug, FromRow)]
pub struct NotificationTaskRow {
    pub id: Uuid,
    pub method: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent: bool,
    pub task_id: Uuid,
    pub task_title: String,
    pub task_due_date: NaiveDate,
    pub task_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskRef {
    pub id: Uuid,
    pub title: String,
    pub due_date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationWithTask {
    pub id: Uuid,
    pub method: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent: bool,
    pub task: TaskRef,
}

impl From<NotificationTaskRow> for NotificationWithTask {
    fn from(row: NotificationTaskRow) -> Self {
        Self {
            id: row.id,
            method: row.method,
            scheduled_at: row.scheduled_at,
            sent: row.sent,
            task: TaskRef {
                id: row.task_id,
                title: row.task_title,
                due_date: row.task_due_date,
                completed: row.task_completed,
            },
        }
    }
}

/// 发送一条通知所需的完整链路：通知→任务→计划→用户
#[derive(Debug, FromRow)]
pub struct SendContext {
    pub method: String,
    pub task_title: String,
    pub due_date: NaiveDate,
    pub user_name: String,
    pub user_email: String,
}

/// 逾期扫描的行：任务加上计划的通知开关和属主邮箱
#[derive(Debug, FromRow)]
pub struct OverdueTaskRow {
    pub task_id: Uuid,
    pub title: String,
    pub due_date: NaiveDate,
    pub notify_by_email: bool,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub task_id: Option<Uuid>,
    pub method: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub notify_by_email: Option<bool>,
    pub notify_by_whatsapp: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub message: String,
    pub notification: Notification,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationWithTask>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message: String,
    pub sent: bool,
}

#[derive(Debug, Serialize)]
pub struct SentEntry {
    pub task_id: Uuid,
    pub method: String,
    pub sent: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckOverdueResponse {
    pub message: String,
    pub overdue_tasks_count: usize,
    pub notifications_sent: Vec<SentEntry>,
}

#[derive(Debug, Serialize)]
pub struct Preferences {
    pub notify_by_email: bool,
    pub notify_by_whatsapp: bool,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub message: String,
    pub preferences: Preferences,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl Notification {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        task_id: Uuid,
        method: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, task_id, method, scheduled_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, task_id, method, scheduled_at, sent
            "#,
        )
        .bind(user_id)
        .bind(task_id)
        .bind(method)
        .bind(scheduled_at)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<NotificationTaskRow>, sqlx::Error> {
        sqlx::query_as::<_, NotificationTaskRow>(
            r#"
            SELECT n.id, n.method, n.scheduled_at, n.sent,
                   t.id AS task_id, t.title AS task_title,
                   t.due_date AS task_due_date, t.completed AS task_completed
            FROM notifications n
            JOIN plan_tasks t ON t.id = n.task_id
            WHERE n.user_id = $1
            ORDER BY n.scheduled_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn send_context(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<SendContext>, sqlx::Error> {
        sqlx::query_as::<_, SendContext>(
            r#"
            SELECT n.method, t.title AS task_title, t.due_date,
                   u.name AS user_name, u.email AS user_email
            FROM notifications n
            JOIN plan_tasks t ON t.id = n.task_id
            JOIN study_plans p ON p.id = t.plan_id
            JOIN users u ON u.id = p.user_id
            WHERE n.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notifications SET sent = true WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}

/// 当前用户所有未完成且已过期的任务
pub async fn overdue_tasks_for_user(
    pool: &PgPool,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<Vec<OverdueTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, OverdueTaskRow>(
        r#"
        SELECT t.id AS task_id, t.title, t.due_date, p.notify_by_email,
               u.name AS user_name, u.email AS user_email
        FROM plan_tasks t
        JOIN study_plans p ON p.id = t.plan_id
        JOIN users u ON u.id = p.user_id
        WHERE p.user_id = $1 AND t.completed = false AND t.due_date < $2
        ORDER BY t.due_date
        "#,
    )
    .bind(user_id)
    .bind(today)
    .fetch_all(pool)
    .await
}

/// 批量开关用户全部计划的通知渠道
pub async fn set_preferences(
    pool: &PgPool,
    user_id: Uuid,
    notify_by_email: bool,
    notify_by_whatsapp: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE study_plans SET notify_by_email = $1, notify_by_whatsapp = $2 WHERE user_id = $3",
    )
    .bind(notify_by_email)
    .bind(notify_by_whatsapp)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}
