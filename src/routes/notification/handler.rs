use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    mailer::{task_overdue_html, task_reminder_html},
    middleware::AuthUser,
    ownership::{ResourceFamily, require_owned},
};

use super::model::{
    CheckOverdueResponse, CreateNotificationRequest, MessageResponse, Notification,
    NotificationListResponse, NotificationResponse, Preferences, PreferencesRequest,
    PreferencesResponse, SendResponse, SentEntry, overdue_tasks_for_user, set_preferences,
};

#[axum::debug_handler]
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(task_id), Some(method), Some(scheduled_at)) =
        (req.task_id, req.method, req.scheduled_at)
    else {
        return Err(AppError::Validation(
            "任务ID、方式和计划时间为必填项".to_string(),
        ));
    };

    if method != "email" {
        return Err(AppError::Validation(
            "目前仅支持email通知方式".to_string(),
        ));
    }

    require_owned(&state.pool, ResourceFamily::Task, task_id, user.id).await?;

    let notification =
        Notification::create(&state.pool, user.id, task_id, &method, scheduled_at).await?;

    Ok((
        StatusCode::CREATED,
        Json(NotificationResponse {
            message: "通知创建成功".to_string(),
            notification,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let notifications = Notification::list_for_user(&state.pool, user.id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok((StatusCode::OK, Json(NotificationListResponse { notifications })))
}

#[axum::debug_handler]
pub async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(
        &state.pool,
        ResourceFamily::Notification,
        notification_id,
        user.id,
    )
    .await?;

    let ctx = Notification::send_context(&state.pool, notification_id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Notification.label()))?;

    if ctx.method != "email" {
        return Err(AppError::Validation(
            "目前仅支持email通知方式".to_string(),
        ));
    }

    let subject = format!("任务提醒：{}", ctx.task_title);
    let html = task_reminder_html(&ctx.user_name, &ctx.task_title, ctx.due_date);
    state.mailer.send(&ctx.user_email, &subject, &html).await?;

    // 仅在投递成功后才标记已发送
    Notification::mark_sent(&state.pool, notification_id).await?;

    Ok((
        StatusCode::OK,
        Json(SendResponse {
            message: "通知发送成功".to_string(),
            sent: true,
        }),
    ))
}

#[axum::debug_handler]
pub async fn check_overdue(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let today = Utc::now().date_naive();
    let overdue = overdue_tasks_for_user(&state.pool, user.id, today).await?;
    let overdue_tasks_count = overdue.len();

    let mut notifications_sent = Vec::new();
    for task in overdue {
        if !task.notify_by_email {
            continue;
        }

        let subject = format!("任务已逾期：{}", task.title);
        let html = task_overdue_html(&task.user_name, &task.title, task.due_date);
        match state.mailer.send(&task.user_email, &subject, &html).await {
            Ok(()) => notifications_sent.push(SentEntry {
                task_id: task.task_id,
                method: "email".to_string(),
                sent: true,
            }),
            Err(err) => {
                tracing::warn!("逾期任务{}的通知发送失败: {}", task.task_id, err);
            }
        }
    }

    Ok((
        StatusCode::OK,
        Json(CheckOverdueResponse {
            message: "逾期任务检查完成".to_string(),
            overdue_tasks_count,
            notifications_sent,
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PreferencesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let notify_by_email = req.notify_by_email.unwrap_or(false);
    let notify_by_whatsapp = req.notify_by_whatsapp.unwrap_or(false);

    set_preferences(&state.pool, user.id, notify_by_email, notify_by_whatsapp).await?;

    Ok((
        StatusCode::OK,
        Json(PreferencesResponse {
            message: "通知偏好更新成功".to_string(),
            preferences: Preferences {
                notify_by_email,
                notify_by_whatsapp,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(
        &state.pool,
        ResourceFamily::Notification,
        notification_id,
        user.id,
    )
    .await?;

    Notification::delete(&state.pool, notification_id).await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "通知删除成功".to_string(),
        }),
    ))
}
