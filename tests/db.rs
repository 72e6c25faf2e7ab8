use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    routing::post,
};
use backend::{
    AppState,
    config::Config,
    error::AppError,
    generation::{GenerationClient, GenerationLocks, PlaceholderExtractor},
    mailer::Mailer,
    ownership::{ResourceFamily, require_owned, resolve},
    routes,
    utils::generate_token,
};
use chrono::{Days, Utc};
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

fn test_config(mail_api_url: String) -> Config {
    let upload_dir = std::env::temp_dir()
        .join(format!("study-backend-{}", Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    Config {
        database_url: String::new(),
        redis_url: "redis://127.0.0.1:1/".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_expiration_secs: 3600,
        rate_limit_window_secs: 60,
        rate_limit_requests: 100,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        api_base_uri: "/api".to_string(),
        upload_dir,
        max_upload_bytes: 10 * 1024 * 1024,
        generation_api_url: "http://127.0.0.1:1/v1/chat/completions".to_string(),
        generation_api_key: "test-key".to_string(),
        generation_model: "test-model".to_string(),
        generation_timeout_secs: 1,
        mail_api_url,
        mail_api_key: "test-key".to_string(),
        mail_from: "noreply@example.com".to_string(),
        mail_timeout_secs: 5,
    }
}

fn build_app(pool: PgPool, config: Config) -> (Router, Config) {
    let redis = Arc::new(redis::Client::open(config.redis_url.clone()).unwrap());
    let state = AppState {
        pool,
        generator: GenerationClient::new(&config),
        mailer: Mailer::new(&config),
        config: config.clone(),
        redis,
        extractor: Arc::new(PlaceholderExtractor),
        generation_locks: GenerationLocks::new(),
    };
    (routes::router(state), config)
}

/// 记录收到的投递次数的邮件桩服务
async fn spawn_mail_stub() -> (String, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = counter.clone();
    let app = Router::new().route(
        "/send",
        post(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/send", addr), counter)
}

async fn insert_user(pool: &PgPool, email: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, role, education_level) \
         VALUES ('测试用户', $1, 'x', 'student', '大学') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_pdf(pool: &PgPool, user_id: Uuid, file_url: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO pdf_uploads (user_id, file_name, file_url, title) \
         VALUES ($1, 'doc.pdf', $2, '资料') RETURNING id",
    )
    .bind(user_id)
    .bind(file_url)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_output(pool: &PgPool, pdf_id: Uuid) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO study_outputs (pdf_id, kind, content) \
         VALUES ($1, 'summary', '摘要内容') RETURNING id",
    )
    .bind(pdf_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_plan(pool: &PgPool, user_id: Uuid, notify_by_email: bool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO study_plans (user_id, title, description, start_date, end_date, notify_by_email) \
         VALUES ($1, '期末复习', '第一轮', '2026-08-01', '2026-12-31', $2) RETURNING id",
    )
    .bind(user_id)
    .bind(notify_by_email)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_task(pool: &PgPool, plan_id: Uuid, due: chrono::NaiveDate) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO plan_tasks (plan_id, title, due_date) \
         VALUES ($1, '复习第一章', $2) RETURNING id",
    )
    .bind(plan_id)
    .bind(due)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_notification(pool: &PgPool, user_id: Uuid, task_id: Uuid) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO notifications (user_id, task_id, method, scheduled_at) \
         VALUES ($1, $2, 'email', now()) RETURNING id",
    )
    .bind(user_id)
    .bind(task_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_progress(pool: &PgPool, user_id: Uuid, output_id: Uuid) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO progress_tracking (user_id, output_id, interaction_type) \
         VALUES ($1, $2, 'view') RETURNING id",
    )
    .bind(user_id)
    .bind(output_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn request(method: Method, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[sqlx::test]
async fn ownership_chain_hides_foreign_resources(pool: PgPool) {
    let owner = insert_user(&pool, "owner@example.com").await;
    let intruder = insert_user(&pool, "intruder@example.com").await;

    let due = Utc::now().date_naive();
    let pdf = insert_pdf(&pool, owner, "/uploads/pdf-a.pdf").await;
    let output = insert_output(&pool, pdf).await;
    let plan = insert_plan(&pool, owner, true).await;
    let task = insert_task(&pool, plan, due).await;
    let notification = insert_notification(&pool, owner, task).await;
    let progress = insert_progress(&pool, owner, output).await;

    let chain = [
        (ResourceFamily::Pdf, pdf),
        (ResourceFamily::Output, output),
        (ResourceFamily::Plan, plan),
        (ResourceFamily::Task, task),
        (ResourceFamily::Notification, notification),
        (ResourceFamily::Progress, progress),
    ];

    for (family, id) in chain {
        // 连接路径解析到根属主
        assert_eq!(resolve(&pool, family, id).await.unwrap(), Some(owner));
        assert!(require_owned(&pool, family, id, owner).await.is_ok());

        // 他人与不存在的ID表现一致
        let foreign = require_owned(&pool, family, id, intruder).await;
        assert!(matches!(foreign, Err(AppError::NotFound(_))), "{:?}", family);
        let absent = require_owned(&pool, family, Uuid::new_v4(), owner).await;
        assert!(matches!(absent, Err(AppError::NotFound(_))), "{:?}", family);
    }
}

#[sqlx::test]
async fn foreign_resources_get_uniform_not_found_over_http(pool: PgPool) {
    let owner = insert_user(&pool, "owner@example.com").await;
    let pdf = insert_pdf(&pool, owner, "/uploads/pdf-a.pdf").await;
    let output = insert_output(&pool, pdf).await;
    let plan = insert_plan(&pool, owner, false).await;

    let intruder = insert_user(&pool, "intruder@example.com").await;
    let (app, config) = build_app(pool, test_config("http://127.0.0.1:1/send".into()));
    let token = generate_token(intruder, &config).unwrap();

    let cases = [
        (format!("/pdfs/{}", pdf), "PDF不存在"),
        (format!("/ai/content/{}", output), "学习内容不存在"),
        (format!("/study/plans/{}", plan), "学习计划不存在"),
        (format!("/pdfs/{}", Uuid::new_v4()), "PDF不存在"),
    ];

    for (uri, message) in cases {
        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error"], message, "{}", uri);
    }
}

#[sqlx::test]
async fn duplicate_generation_points_at_existing_output(pool: PgPool) {
    let user = insert_user(&pool, "owner@example.com").await;
    let pdf = insert_pdf(&pool, user, "/uploads/pdf-a.pdf").await;
    let existing = insert_output(&pool, pdf).await;

    let (app, config) = build_app(pool, test_config("http://127.0.0.1:1/send".into()));
    let token = generate_token(user, &config).unwrap();

    let response = app
        .oneshot(request(
            Method::POST,
            &format!("/ai/generate/{}", pdf),
            &token,
            Some(json!({"type": "summary"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "该PDF已存在此类型的内容");
    assert_eq!(json["output_id"], existing.to_string());
}

#[sqlx::test]
async fn deleting_a_pdf_cascades_to_outputs(pool: PgPool) {
    let user = insert_user(&pool, "owner@example.com").await;
    let pdf = insert_pdf(&pool, user, "/uploads/pdf-gone.pdf").await;
    insert_output(&pool, pdf).await;

    let (app, config) = build_app(pool.clone(), test_config("http://127.0.0.1:1/send".into()));
    let token = generate_token(user, &config).unwrap();

    // 磁盘上没有对应文件，删除失败只记日志，不影响响应
    let response = app
        .oneshot(request(Method::DELETE, &format!("/pdfs/{}", pdf), &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pdfs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pdf_uploads WHERE id = $1")
        .bind(pdf)
        .fetch_one(&pool)
        .await
        .unwrap();
    let outputs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM study_outputs WHERE pdf_id = $1")
        .bind(pdf)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(pdfs, 0);
    assert_eq!(outputs, 0);
}

#[sqlx::test]
async fn sparse_update_leaves_absent_columns_untouched(pool: PgPool) {
    let user = insert_user(&pool, "owner@example.com").await;
    let plan = insert_plan(&pool, user, true).await;

    let (app, config) = build_app(pool.clone(), test_config("http://127.0.0.1:1/send".into()));
    let token = generate_token(user, &config).unwrap();

    // 只更新标题，其余字段保持原值
    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            &format!("/study/plans/{}", plan),
            &token,
            Some(json!({"title": "新标题"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (title, description, notify_by_email): (String, Option<String>, bool) =
        sqlx::query_as("SELECT title, description, notify_by_email FROM study_plans WHERE id = $1")
            .bind(plan)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(title, "新标题");
    assert_eq!(description.as_deref(), Some("第一轮"));
    assert!(notify_by_email);

    // 显式null清空描述，标题保持上一步的值
    let response = app
        .oneshot(request(
            Method::PUT,
            &format!("/study/plans/{}", plan),
            &token,
            Some(json!({"description": null})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (title, description): (String, Option<String>) =
        sqlx::query_as("SELECT title, description FROM study_plans WHERE id = $1")
            .bind(plan)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(title, "新标题");
    assert_eq!(description, None);
}

#[sqlx::test]
async fn overdue_scan_mails_only_email_enabled_plans(pool: PgPool) {
    let user = insert_user(&pool, "owner@example.com").await;
    let today = Utc::now().date_naive();
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap();

    let mailing_plan = insert_plan(&pool, user, true).await;
    let silent_plan = insert_plan(&pool, user, false).await;
    let overdue_task = insert_task(&pool, mailing_plan, yesterday).await;
    insert_task(&pool, silent_plan, yesterday).await;
    // 未到期的任务不进扫描结果
    insert_task(&pool, mailing_plan, tomorrow).await;

    let (mail_url, deliveries) = spawn_mail_stub().await;
    let (app, config) = build_app(pool, test_config(mail_url));
    let token = generate_token(user, &config).unwrap();

    let response = app
        .oneshot(request(
            Method::POST,
            "/notifications/check-overdue",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["overdue_tasks_count"], 2);
    let sent = json["notifications_sent"].as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["task_id"], overdue_task.to_string());
    assert_eq!(sent[0]["sent"], true);
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}

#[sqlx::test]
async fn duplicate_registration_is_rejected(pool: PgPool) {
    let (app, _config) = build_app(pool, test_config("http://127.0.0.1:1/send".into()));
    let payload = json!({
        "name": "小李",
        "email": "dup@example.com",
        "password": "s3cret",
        "role": "student",
    });

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let json = body_json(second).await;
    assert_eq!(json["error"], "该邮箱已注册");
}

#[sqlx::test]
async fn uploaded_file_is_streamed_back(pool: PgPool) {
    let user = insert_user(&pool, "owner@example.com").await;
    let stored_name = format!("pdf-{}.pdf", Uuid::new_v4());
    insert_pdf(&pool, user, &format!("/uploads/{}", stored_name)).await;

    let (app, config) = build_app(pool, test_config("http://127.0.0.1:1/send".into()));
    tokio::fs::create_dir_all(&config.upload_dir).await.unwrap();
    let content = b"%PDF-1.4 test bytes";
    tokio::fs::write(
        std::path::Path::new(&config.upload_dir).join(&stored_name),
        content,
    )
    .await
    .unwrap();

    let token = generate_token(user, &config).unwrap();
    let response = app
        .oneshot(request(
            Method::GET,
            &format!("/pdfs/file/{}", stored_name),
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], content);
}
