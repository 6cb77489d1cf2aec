//! 记忆模型：偏好 / 基础设施知识 / 调查摘要与统一记录信封
//!
//! 三类业务记录均为追加写、多次读；去重由存储端自行决定，编排器不保证唯一性。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 记忆类别，决定命名空间与检索范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// 用户偏好（升级联系人、通知渠道等）
    Preferences,
    /// 基础设施知识（依赖关系、性能基线），按发现它的工作者分区
    Infrastructure,
    /// 调查摘要（时间线、动作、结论）
    Investigations,
    /// 对话记录（user/assistant 消息对）
    Conversations,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Preferences => "preferences",
            MemoryKind::Infrastructure => "infrastructure",
            MemoryKind::Investigations => "investigations",
            MemoryKind::Conversations => "conversations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preferences" => Some(MemoryKind::Preferences),
            "infrastructure" => Some(MemoryKind::Infrastructure),
            "investigations" => Some(MemoryKind::Investigations),
            "conversations" => Some(MemoryKind::Conversations),
            _ => None,
        }
    }

    /// 该类别下 actor 的命名空间（记录的分区键）
    pub fn namespace(&self, actor_id: &str) -> String {
        match self {
            MemoryKind::Preferences => format!("/sre/users/{}/preferences", actor_id),
            MemoryKind::Infrastructure => format!("/sre/infrastructure/{}", actor_id),
            MemoryKind::Investigations => format!("/sre/investigations/{}", actor_id),
            MemoryKind::Conversations => format!("/sre/conversations/{}", actor_id),
        }
    }

    /// 从命名空间反解 actor（列表 / 分组展示用）
    pub fn actor_from_namespace(&self, namespace: &str) -> Option<String> {
        match self {
            MemoryKind::Preferences => namespace
                .strip_prefix("/sre/users/")
                .and_then(|rest| rest.strip_suffix("/preferences"))
                .map(String::from),
            _ => namespace
                .strip_prefix(&format!("/sre/{}/", self.as_str()))
                .map(String::from),
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户偏好记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    /// 偏好类型：escalation / notification / workflow / style
    pub preference_type: String,
    /// 偏好内容（如 {"contact": "ops@example.com"}）
    pub preference_value: serde_json::Value,
    /// 捕获该偏好的上下文
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// 基础设施知识记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfrastructureKnowledge {
    pub service_name: String,
    /// 知识类型：dependency / pattern / config / baseline
    pub knowledge_type: String,
    pub knowledge_data: serde_json::Value,
    /// 置信度 0.0-1.0
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    0.8
}

/// 调查时间线条目（按工作者执行顺序重建）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub worker: String,
    pub action: String,
    /// 结果摘要（截断到 200 字符）
    pub result_summary: String,
}

/// 调查结论状态（按关键词分类）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Completed,
    Escalated,
    Ongoing,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Completed => "completed",
            ResolutionStatus::Escalated => "escalated",
            ResolutionStatus::Ongoing => "ongoing",
        }
    }
}

/// 调查摘要记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvestigationSummary {
    pub incident_id: String,
    /// 触发调查的原始查询
    pub query: String,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub actions_taken: Vec<String>,
    pub resolution_status: ResolutionStatus,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// 存储层的统一信封：命名空间 + 任意 JSON 负载
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub namespace: String,
    pub payload: serde_json::Value,
    /// 写入该记录的会话（跨会话泄漏排查用）
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(namespace: String, payload: serde_json::Value, session_id: &str) -> Self {
        Self {
            namespace,
            payload,
            session_id: Some(session_id.to_string()),
            created_at: Utc::now(),
        }
    }
}
