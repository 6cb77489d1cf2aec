//! 知识抽取：从工作者回复文本中挖掘偏好与基础设施知识
//!
//! 抽取是启发式、尽力而为的：漏报正常且无害。默认实现 `RegexExtractor`
//! 用固定短语模板做正则匹配；trait 之后可换更严格或基于模型的抽取器，
//! 钩子层的契约不变。

use regex::Regex;
use serde_json::json;

use crate::memory::records::{InfrastructureKnowledge, ResolutionStatus, UserPreference};

/// 抽取器接口：偏好、知识、关键发现与结论状态
pub trait KnowledgeExtractor: Send + Sync {
    /// 从文本抽取用户偏好（升级联系人、通知渠道）
    fn extract_preferences(&self, text: &str, user_id: &str, context: &str) -> Vec<UserPreference>;

    /// 从文本抽取基础设施知识；include_baselines 仅对指标类工作者开启
    fn extract_knowledge(
        &self,
        text: &str,
        discovered_by: &str,
        include_baselines: bool,
    ) -> Vec<InfrastructureKnowledge>;

    /// 从最终回复抽取关键发现
    fn extract_key_findings(&self, text: &str) -> Vec<String>;

    /// 按关键词分类结论状态
    fn classify_resolution(&self, text: &str) -> ResolutionStatus;
}

/// 正则抽取器：固定短语模板（"escalate to <email>"、"<service> depends on <service>"、
/// "baseline <metric> is <value>" 等）
pub struct RegexExtractor {
    escalation_patterns: Vec<Regex>,
    channel_patterns: Vec<Regex>,
    dependency_patterns: Vec<Regex>,
    baseline_patterns: Vec<Regex>,
    finding_patterns: Vec<Regex>,
}

const EMAIL: &str = r"([\w.+-]+@[\w-]+(?:\.[\w-]+)+)";

impl RegexExtractor {
    pub fn new() -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                // 模板是编译期常量，失败属于程序错误
                .map(|p| Regex::new(p).unwrap())
                .collect()
        };

        Self {
            escalation_patterns: compile(&[
                format!(r"(?i)escalate to {EMAIL}"),
                format!(r"(?i)contact {EMAIL}"),
                format!(r"(?i)notify {EMAIL}"),
                format!(r"(?i)reach out to {EMAIL}"),
            ]),
            channel_patterns: compile(&[
                r"(?i)send to (#[\w-]+)".to_string(),
                r"(?i)notify (#[\w-]+)".to_string(),
                r"(?i)alert (#[\w-]+)".to_string(),
                r"(?i)post to (#[\w-]+)".to_string(),
            ]),
            dependency_patterns: compile(&[
                r"(?i)(\w+) depends on (\w+)".to_string(),
                r"(?i)(\w+) requires (\w+)".to_string(),
                r"(?i)(\w+) connects to (\w+)".to_string(),
            ]),
            baseline_patterns: compile(&[
                r"(?i)baseline (\w+) is ([0-9.]+)".to_string(),
                r"(?i)normal (\w+) is ([0-9.]+)".to_string(),
                r"(?i)typical (\w+) ranges from ([0-9.]+) to ([0-9.]+)".to_string(),
            ]),
            finding_patterns: compile(&[
                r"(?i)(?:found|discovered|identified|detected):\s*([^.]+)".to_string(),
                r"(?i)(?:issue|problem|error):\s*([^.]+)".to_string(),
                r"(?i)(?:solution|fix|resolution):\s*([^.]+)".to_string(),
            ]),
        }
    }
}

impl Default for RegexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeExtractor for RegexExtractor {
    fn extract_preferences(&self, text: &str, user_id: &str, context: &str) -> Vec<UserPreference> {
        let mut preferences = Vec::new();

        for pattern in &self.escalation_patterns {
            for caps in pattern.captures_iter(text) {
                let contact = &caps[1];
                tracing::debug!("Found escalation pattern: '{}' -> {}", &caps[0], contact);
                preferences.push(UserPreference {
                    user_id: user_id.to_string(),
                    preference_type: "escalation".to_string(),
                    preference_value: json!({ "contact": contact }),
                    context: Some(format!("Mentioned during {} worker response", context)),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        for pattern in &self.channel_patterns {
            for caps in pattern.captures_iter(text) {
                let channel = &caps[1];
                tracing::debug!("Found notification pattern: '{}' -> {}", &caps[0], channel);
                preferences.push(UserPreference {
                    user_id: user_id.to_string(),
                    preference_type: "notification".to_string(),
                    preference_value: json!({ "channel": channel }),
                    context: Some(format!("Mentioned during {} worker response", context)),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        preferences
    }

    fn extract_knowledge(
        &self,
        text: &str,
        discovered_by: &str,
        include_baselines: bool,
    ) -> Vec<InfrastructureKnowledge> {
        let mut knowledge = Vec::new();

        for pattern in &self.dependency_patterns {
            for caps in pattern.captures_iter(text) {
                let service = &caps[1];
                let dependency = &caps[2];
                tracing::debug!(
                    "Found dependency pattern: '{}' -> {} depends on {}",
                    &caps[0],
                    service,
                    dependency
                );
                knowledge.push(InfrastructureKnowledge {
                    service_name: service.to_string(),
                    knowledge_type: "dependency".to_string(),
                    knowledge_data: json!({
                        "depends_on": dependency,
                        "discovered_by": discovered_by,
                    }),
                    confidence: 0.7,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        if include_baselines {
            for pattern in &self.baseline_patterns {
                for caps in pattern.captures_iter(text) {
                    let metric = &caps[1];
                    let value = &caps[2];
                    tracing::debug!(
                        "Found baseline pattern: '{}' -> {} = {}",
                        &caps[0],
                        metric,
                        value
                    );
                    knowledge.push(InfrastructureKnowledge {
                        service_name: "system".to_string(),
                        knowledge_type: "baseline".to_string(),
                        knowledge_data: json!({
                            "metric": metric,
                            "value": value,
                            "discovered_by": discovered_by,
                        }),
                        confidence: 0.8,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        knowledge
    }

    fn extract_key_findings(&self, text: &str) -> Vec<String> {
        let mut findings = Vec::new();
        for pattern in &self.finding_patterns {
            for caps in pattern.captures_iter(text) {
                let finding = caps[1].trim().to_string();
                // 过短的匹配多半是噪音
                if finding.len() > 10 {
                    findings.push(finding);
                }
            }
        }
        findings.truncate(5);
        findings
    }

    fn classify_resolution(&self, text: &str) -> ResolutionStatus {
        let lower = text.to_lowercase();
        if ["resolved", "fixed", "solved", "completed"]
            .iter()
            .any(|w| lower.contains(w))
        {
            ResolutionStatus::Completed
        } else if ["escalat", "contact", "need help"]
            .iter()
            .any(|w| lower.contains(w))
        {
            ResolutionStatus::Escalated
        } else {
            ResolutionStatus::Ongoing
        }
    }
}
