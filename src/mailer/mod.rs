use chrono::NaiveDate;

use crate::config::Config;
use crate::error::AppError;

/// 对HTTP邮件接口的封装：单次投递、限定超时、不重试
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl Mailer {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.mail_timeout())
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
        }
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let body = serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "html": html,
        });

        self.http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

pub fn task_reminder_html(name: &str, task_title: &str, due_date: NaiveDate) -> String {
    format!(
        "<h2>学习提醒</h2>\
         <p>你好，{name}：</p>\
         <p>你有一项待完成的任务：</p>\
         <h3>{task_title}</h3>\
         <p><strong>截止日期：</strong>{due_date}</p>\
         <p>别忘了按时完成！</p>\
         <br>\
         <p>学习助手团队</p>"
    )
}

pub fn task_overdue_html(name: &str, task_title: &str, due_date: NaiveDate) -> String {
    format!(
        "<h2>逾期提醒</h2>\
         <p>你好，{name}：</p>\
         <p>你有一项已经逾期的任务：</p>\
         <h3>{task_title}</h3>\
         <p><strong>截止日期：</strong>{due_date}</p>\
         <p style=\"color: red;\">任务已逾期，请尽快完成！</p>\
         <br>\
         <p>学习助手团队</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_template_mentions_user_and_task() {
        let due = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let html = task_reminder_html("小李", "复习第三章", due);
        assert!(html.contains("小李"));
        assert!(html.contains("复习第三章"));
        assert!(html.contains("2026-09-01"));
    }

    #[test]
    fn overdue_template_differs_from_reminder() {
        let due = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let reminder = task_reminder_html("小李", "复习第三章", due);
        let overdue = task_overdue_html("小李", "复习第三章", due);
        assert_ne!(reminder, overdue);
        assert!(overdue.contains("逾期"));
    }
}
