use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// 六类受属主保护的资源，每类有自己到根属主的连接路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFamily {
    Pdf,
    Output,
    Plan,
    Task,
    Notification,
    Progress,
}

impl ResourceFamily {
    /// 连接路径以声明式SQL保存：给定资源ID，查出根属主的用户ID（1~3跳）
    const fn owner_query(self) -> &'static str {
        match self {
            ResourceFamily::Pdf => "SELECT user_id FROM pdf_uploads WHERE id = $1",
            ResourceFamily::Output => {
                "SELECT p.user_id FROM study_outputs o \
                 JOIN pdf_uploads p ON p.id = o.pdf_id \
                 WHERE o.id = $1"
            }
            ResourceFamily::Plan => "SELECT user_id FROM study_plans WHERE id = $1",
            ResourceFamily::Task => {
                "SELECT p.user_id FROM plan_tasks t \
                 JOIN study_plans p ON p.id = t.plan_id \
                 WHERE t.id = $1"
            }
            ResourceFamily::Notification => {
                "SELECT p.user_id FROM notifications n \
                 JOIN plan_tasks t ON t.id = n.task_id \
                 JOIN study_plans p ON p.id = t.plan_id \
                 WHERE n.id = $1"
            }
            ResourceFamily::Progress => "SELECT user_id FROM progress_tracking WHERE id = $1",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ResourceFamily::Pdf => "PDF",
            ResourceFamily::Output => "学习内容",
            ResourceFamily::Plan => "学习计划",
            ResourceFamily::Task => "任务",
            ResourceFamily::Notification => "通知",
            ResourceFamily::Progress => "进度记录",
        }
    }
}

pub async fn resolve(
    pool: &PgPool,
    family: ResourceFamily,
    id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(family.owner_query())
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// 资源不存在与属主不符返回同一个404，避免通过状态码探测他人资源
pub async fn require_owned(
    pool: &PgPool,
    family: ResourceFamily,
    id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    match resolve(pool, family, id).await? {
        Some(owner) if owner == user_id => Ok(()),
        _ => Err(AppError::NotFound(family.label())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_has_a_join_path() {
        let families = [
            ResourceFamily::Pdf,
            ResourceFamily::Output,
            ResourceFamily::Plan,
            ResourceFamily::Task,
            ResourceFamily::Notification,
            ResourceFamily::Progress,
        ];
        for family in families {
            let sql = family.owner_query();
            assert!(sql.starts_with("SELECT"), "{:?}", family);
            assert!(sql.contains("user_id"), "{:?}", family);
            assert!(sql.contains("$1"), "{:?}", family);
            assert!(!family.label().is_empty());
        }
    }

    #[test]
    fn chain_depth_matches_family() {
        // 一跳资源直接查属主列，多跳资源必须带JOIN
        assert!(!ResourceFamily::Pdf.owner_query().contains("JOIN"));
        assert!(!ResourceFamily::Plan.owner_query().contains("JOIN"));
        assert!(ResourceFamily::Output.owner_query().contains("JOIN"));
        assert!(ResourceFamily::Task.owner_query().contains("JOIN"));
        assert_eq!(
            ResourceFamily::Notification
                .owner_query()
                .matches("JOIN")
                .count(),
            2
        );
    }
}
