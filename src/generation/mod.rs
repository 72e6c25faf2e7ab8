use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

/// 七种固定的生成内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_kind", rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    VideoRecommendation,
    TextRecommendation,
    MultipleChoice,
    TrueFalse,
    Flashcards,
    PracticeProblem,
}

impl ContentKind {
    pub const ALL: [ContentKind; 7] = [
        ContentKind::Summary,
        ContentKind::VideoRecommendation,
        ContentKind::TextRecommendation,
        ContentKind::MultipleChoice,
        ContentKind::TrueFalse,
        ContentKind::Flashcards,
        ContentKind::PracticeProblem,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ContentKind::Summary => "summary",
            ContentKind::VideoRecommendation => "video_recommendation",
            ContentKind::TextRecommendation => "text_recommendation",
            ContentKind::MultipleChoice => "multiple_choice",
            ContentKind::TrueFalse => "true_false",
            ContentKind::Flashcards => "flashcards",
            ContentKind::PracticeProblem => "practice_problem",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 按内容类型构造提示词，带上提取出的原文和用户的教育阶段
    pub fn prompt(self, text: &str, education_level: &str) -> String {
        match self {
            ContentKind::Summary => format!(
                "请为下面的文本生成一份学习摘要。教育阶段：{education_level}。\
                 需要包含：主要观点、关键概念、结构化提纲、需要记住的要点。\n\n文本：{text}"
            ),
            ContentKind::VideoRecommendation => format!(
                "请根据下面的文本推荐3到5个相关的教学视频。教育阶段：{education_level}。\
                 每个视频给出：建议标题、内容简介、推荐平台、预计时长、推荐理由。\n\n文本：{text}"
            ),
            ContentKind::TextRecommendation => format!(
                "请根据下面的文本推荐3到5篇补充阅读材料。教育阶段：{education_level}。\
                 每篇材料给出：建议标题、作者或来源、内容简介、难度、与原文的互补关系。\n\n文本：{text}"
            ),
            ContentKind::MultipleChoice => format!(
                "请根据下面的文本出10道单项选择题。教育阶段：{education_level}。\
                 每道题给出：题干、A/B/C/D四个选项、正确答案、答案解析。\n\n文本：{text}"
            ),
            ContentKind::TrueFalse => format!(
                "请根据下面的文本出10道判断题。教育阶段：{education_level}。\
                 每道题给出：清晰的陈述、答案（对/错）、解析。\n\n文本：{text}"
            ),
            ContentKind::Flashcards => format!(
                "请根据下面的文本制作15张学习卡片。教育阶段：{education_level}。\
                 每张卡片给出：正面的概念或问题、背面的定义或答案、所属主题分类。\n\n文本：{text}"
            ),
            ContentKind::PracticeProblem => format!(
                "请根据下面的文本出5道练习题。教育阶段：{education_level}。\
                 每道题给出：题目描述、已知条件、解题步骤、答案、过程说明。\n\n文本：{text}"
            ),
        }
    }
}

const SYSTEM_PROMPT: &str = "你是一名资深的教育助手，按照指定的教育阶段生成高质量的学习内容，\
始终以合法的JSON格式回答。";

/// 文本提取是可插拔能力：当前实现只返回占位文本，不做真正的PDF解析
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file_url: &str) -> Result<String, AppError>;
}

pub struct PlaceholderExtractor;

impl TextExtractor for PlaceholderExtractor {
    fn extract(&self, _file_url: &str) -> Result<String, AppError> {
        Ok("这是从PDF中提取的示例内容，包含用户上传资料里的教学信息，\
            供生成个性化学习资源使用。"
            .to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// 对外部文本生成服务的同步调用封装，单次请求、不重试
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GenerationClient {
    pub fn new(config: &Config) -> Self {
        // 限定超时，避免生成调用把handler挂死
        let http = reqwest::Client::builder()
            .timeout(config.generation_timeout())
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url: config.generation_api_url.clone(),
            api_key: config.generation_api_key.clone(),
            model: config.generation_model.clone(),
        }
    }

    pub async fn generate(
        &self,
        kind: ContentKind,
        text: &str,
        education_level: &str,
    ) -> Result<String, AppError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": kind.prompt(text, education_level) },
            ],
            "temperature": 0.7,
            "max_tokens": 2000,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Internal("generation response had no choices".into()))?;

        Ok(content)
    }
}

/// 同一(pdf, 类型)指纹最多允许一个在途生成请求。
/// 存在性预检和插入是两次独立往返，这把锁挡住并发重复请求；
/// 存储层没有唯一约束，跨进程的竞态仍然存在。
#[derive(Clone, Default)]
pub struct GenerationLocks {
    in_flight: Arc<Mutex<HashSet<(Uuid, ContentKind)>>>,
}

impl GenerationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, pdf_id: Uuid, kind: ContentKind) -> Option<GenerationPermit> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if set.insert((pdf_id, kind)) {
            Some(GenerationPermit {
                key: (pdf_id, kind),
                in_flight: Arc::clone(&self.in_flight),
            })
        } else {
            None
        }
    }
}

pub struct GenerationPermit {
    key: (Uuid, ContentKind),
    in_flight: Arc<Mutex<HashSet<(Uuid, ContentKind)>>>,
}

impl Drop for GenerationPermit {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_roundtrip() {
        for kind in ContentKind::ALL {
            assert_eq!(ContentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContentKind::parse("poetry"), None);
        assert_eq!(ContentKind::parse(""), None);
    }

    #[test]
    fn kind_serde_matches_as_str() {
        for kind in ContentKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn prompt_carries_text_and_level() {
        for kind in ContentKind::ALL {
            let prompt = kind.prompt("光合作用的原理", "高中");
            assert!(prompt.contains("光合作用的原理"), "{:?}", kind);
            assert!(prompt.contains("高中"), "{:?}", kind);
        }
    }

    #[test]
    fn placeholder_extractor_returns_text() {
        let text = PlaceholderExtractor.extract("/uploads/pdf-x.pdf").unwrap();
        assert!(!text.is_empty());
    }

    #[test]
    fn permit_is_exclusive_per_fingerprint() {
        let locks = GenerationLocks::new();
        let pdf_id = Uuid::new_v4();

        let permit = locks.try_acquire(pdf_id, ContentKind::Summary);
        assert!(permit.is_some());
        // 相同指纹被拒绝，不同指纹不受影响
        assert!(locks.try_acquire(pdf_id, ContentKind::Summary).is_none());
        assert!(locks.try_acquire(pdf_id, ContentKind::Flashcards).is_some());
        assert!(
            locks
                .try_acquire(Uuid::new_v4(), ContentKind::Summary)
                .is_some()
        );

        drop(permit);
        assert!(locks.try_acquire(pdf_id, ContentKind::Summary).is_some());
    }
}
