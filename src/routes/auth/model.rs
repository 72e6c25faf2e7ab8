use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::middleware::AuthUser;

#[derive(Debug, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub education_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 登录校验用的内部行，带口令哈希，不对外序列化
#[derive(Debug, FromRow)]
pub struct LoginRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub education_level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub password_hash: String,
}

impl From<LoginRow> for UserProfile {
    fn from(row: LoginRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            role: row.role,
            education_level: row.education_level,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub education_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: AuthUser,
}

impl UserProfile {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        role: &str,
        education_level: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO users (name, email, password_hash, role, education_level)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, role, education_level, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(education_level)
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_login(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<LoginRow>, sqlx::Error> {
        sqlx::query_as::<_, LoginRow>(
            r#"
            SELECT id, name, email, role, education_level, created_at, password_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }
}
