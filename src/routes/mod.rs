use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

use crate::{AppState, middleware::auth_middleware};

pub mod ai;
pub mod auth;
pub mod health;
pub mod notification;
pub mod pdf;
pub mod study;

/// 组装API路由：公开路由与需要认证的路由分开，后者统一挂认证中间件
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::ping))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        // 用户
        .route("/auth/profile", get(auth::profile))
        // PDF上传
        .route(
            "/pdfs/upload",
            post(pdf::upload).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route("/pdfs/my-pdfs", get(pdf::list_my_pdfs))
        .route("/pdfs/file/{filename}", get(pdf::serve_file))
        .route(
            "/pdfs/{id}",
            get(pdf::get_pdf).put(pdf::update_title).delete(pdf::delete_pdf),
        )
        // 内容生成
        .route("/ai/generate/{pdf_id}", post(ai::generate))
        .route(
            "/ai/content/{output_id}",
            get(ai::get_content).delete(ai::delete_content),
        )
        .route("/ai/pdf/{pdf_id}", get(ai::list_for_pdf))
        .route("/ai/regenerate/{output_id}", post(ai::regenerate))
        // 学习计划与任务
        .route("/study/plans", post(study::create_plan).get(study::list_plans))
        .route(
            "/study/plans/{plan_id}",
            get(study::get_plan)
                .put(study::update_plan)
                .delete(study::delete_plan),
        )
        .route("/study/plans/{plan_id}/tasks", post(study::create_task))
        .route(
            "/study/tasks/{task_id}",
            put(study::update_task).delete(study::delete_task),
        )
        // 学习进度
        .route("/study/progress", post(study::record_progress))
        .route("/study/progress/stats", get(study::progress_stats))
        .route("/study/progress/history", get(study::progress_history))
        // 通知
        .route(
            "/notifications",
            post(notification::create).get(notification::list),
        )
        .route("/notifications/send/{notification_id}", post(notification::send))
        .route("/notifications/check-overdue", post(notification::check_overdue))
        .route("/notifications/preferences", put(notification::update_preferences))
        .route(
            "/notifications/{notification_id}",
            delete(notification::delete),
        )
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
