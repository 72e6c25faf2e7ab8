use std::collections::HashMap;

use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::AuthUser,
    ownership::{ResourceFamily, require_owned},
};

use super::model::{
    CreatePlanRequest, CreateProgressRequest, CreateTaskRequest, HistoryResponse, MessageResponse,
    PlanDetail, PlanDetailResponse, PlanListResponse, PlanResponse, PlanTask, PlanWithTasks,
    ProgressRecord, ProgressResponse, Stats, StatsResponse, StudyPlan, TaskBrief, TaskResponse,
    UpdatePlanRequest, UpdateTaskRequest,
};

#[axum::debug_handler]
pub async fn create_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(title), Some(start_date), Some(end_date)) =
        (req.title.clone(), req.start_date, req.end_date)
    else {
        return Err(AppError::Validation(
            "标题、开始日期和结束日期为必填项".to_string(),
        ));
    };

    let plan = StudyPlan::create(&state.pool, user.id, &req, &title, start_date, end_date).await?;

    Ok((
        StatusCode::CREATED,
        Json(PlanResponse {
            message: "学习计划创建成功".to_string(),
            plan,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_plans(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let plans = StudyPlan::list_for_user(&state.pool, user.id).await?;
    let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();

    let mut grouped: HashMap<Uuid, Vec<TaskBrief>> = HashMap::new();
    for task in PlanTask::briefs_for_plans(&state.pool, &plan_ids).await? {
        grouped.entry(task.plan_id).or_default().push(task);
    }

    let plans = plans
        .into_iter()
        .map(|plan| PlanWithTasks {
            plan_tasks: grouped.remove(&plan.id).unwrap_or_default(),
            id: plan.id,
            title: plan.title,
            description: plan.description,
            start_date: plan.start_date,
            end_date: plan.end_date,
            notify_by_email: plan.notify_by_email,
            notify_by_whatsapp: plan.notify_by_whatsapp,
            created_at: plan.created_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(PlanListResponse { plans })))
}

#[axum::debug_handler]
pub async fn get_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Plan, plan_id, user.id).await?;

    let plan = StudyPlan::find(&state.pool, plan_id)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Plan.label()))?;
    let plan_tasks = PlanTask::detail_for_plan(&state.pool, plan_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok((
        StatusCode::OK,
        Json(PlanDetailResponse {
            plan: PlanDetail {
                id: plan.id,
                title: plan.title,
                description: plan.description,
                start_date: plan.start_date,
                end_date: plan.end_date,
                notify_by_email: plan.notify_by_email,
                notify_by_whatsapp: plan.notify_by_whatsapp,
                created_at: plan.created_at,
                plan_tasks,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.is_empty() {
        return Err(AppError::Validation("没有需要更新的字段".to_string()));
    }

    require_owned(&state.pool, ResourceFamily::Plan, plan_id, user.id).await?;

    let plan = StudyPlan::sparse_update(&state.pool, plan_id, &req)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Plan.label()))?;

    Ok((
        StatusCode::OK,
        Json(PlanResponse {
            message: "学习计划更新成功".to_string(),
            plan,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Plan, plan_id, user.id).await?;

    StudyPlan::delete(&state.pool, plan_id).await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "学习计划删除成功".to_string(),
        }),
    ))
}

#[axum::debug_handler]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(title), Some(due_date)) = (req.title, req.due_date) else {
        return Err(AppError::Validation("标题和截止日期为必填项".to_string()));
    };

    require_owned(&state.pool, ResourceFamily::Plan, plan_id, user.id).await?;

    let task = PlanTask::create(
        &state.pool,
        plan_id,
        &title,
        req.description.as_deref(),
        due_date,
        req.related_output_id,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(TaskResponse {
            message: "任务创建成功".to_string(),
            task,
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.is_empty() {
        return Err(AppError::Validation("没有需要更新的字段".to_string()));
    }

    require_owned(&state.pool, ResourceFamily::Task, task_id, user.id).await?;

    let task = PlanTask::sparse_update(&state.pool, task_id, &req)
        .await?
        .ok_or(AppError::NotFound(ResourceFamily::Task.label()))?;

    Ok((
        StatusCode::OK,
        Json(TaskResponse {
            message: "任务更新成功".to_string(),
            task,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_owned(&state.pool, ResourceFamily::Task, task_id, user.id).await?;

    PlanTask::delete(&state.pool, task_id).await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "任务删除成功".to_string(),
        }),
    ))
}

#[axum::debug_handler]
pub async fn record_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(output_id), Some(interaction_type)) = (req.output_id, req.interaction_type) else {
        return Err(AppError::Validation(
            "内容ID和交互类型为必填项".to_string(),
        ));
    };

    // 进度指向的内容必须属于当前用户（output→pdf→user链）
    require_owned(&state.pool, ResourceFamily::Output, output_id, user.id).await?;

    let progress =
        ProgressRecord::create(&state.pool, user.id, output_id, &interaction_type, req.score)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProgressResponse {
            message: "进度记录成功".to_string(),
            progress,
        }),
    ))
}

#[axum::debug_handler]
pub async fn progress_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let total_interactions = ProgressRecord::total_for_user(&state.pool, user.id).await?;
    let (completed_tasks, pending_tasks) = ProgressRecord::task_counts(&state.pool, user.id).await?;
    let top_content = ProgressRecord::top_content(&state.pool, user.id).await?;

    Ok((
        StatusCode::OK,
        Json(StatsResponse {
            stats: Stats {
                total_interactions,
                completed_tasks,
                pending_tasks,
                top_content,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn progress_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let history = ProgressRecord::history(&state.pool, user.id).await?;

    Ok((StatusCode::OK, Json(HistoryResponse { history })))
}
