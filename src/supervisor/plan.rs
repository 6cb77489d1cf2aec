//! 调查计划与路由决策值对象
//!
//! 两者都由 LLM 以结构化输出产生，建成后不可变；计划的执行进度由状态里的
//! 游标推进，不改计划本身。LLM 偶尔把 steps 给成一段带编号的文本而不是数组，
//! 反序列化时就地归一化（按行拆分、剥掉序号），不让调查因此失败。

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::workers::WorkerKind;

/// 计划复杂度：simple 自动执行，complex 默认需人工审批
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Complex,
}

/// 调查计划：有序步骤 + 工作者序列 + 复杂度与审批标记
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvestigationPlan {
    /// 2-5 条自然语言步骤
    #[serde(deserialize_with = "steps_string_or_list")]
    pub steps: Vec<String>,
    /// 依次调用的工作者（固定枚举，未知名字解析即失败）
    pub agents_sequence: Vec<WorkerKind>,
    pub complexity: Complexity,
    /// 是否免审批直接执行
    pub auto_execute: bool,
    /// 调查思路简述
    #[serde(default)]
    pub reasoning: String,
}

/// steps 给成单个字符串时按行拆分并剥掉 "1." 式编号
fn steps_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        Text(String),
        List(Vec<String>),
    }

    match StringOrList::deserialize(deserializer)? {
        StringOrList::List(list) => Ok(list),
        StringOrList::Text(text) => Ok(split_numbered_steps(&text)),
    }
}

fn split_numbered_steps(text: &str) -> Vec<String> {
    // 模板是编译期常量，失败属于程序错误
    let numbering = Regex::new(r"^\d+\.\s*").unwrap();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| numbering.replace(line, "").to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

impl InvestigationPlan {
    /// 收尾归一化：步骤截断到 5 条；步骤为空时按工作者序列合成；
    /// 工作者序列为空时兜底到 runbooks（仍可给出操作指引）
    pub fn normalized(mut self) -> Self {
        if self.agents_sequence.is_empty() {
            tracing::warn!("Plan arrived with empty agents_sequence, falling back to runbooks");
            self.agents_sequence.push(WorkerKind::Runbooks);
        }
        if self.steps.is_empty() {
            self.steps = self
                .agents_sequence
                .iter()
                .map(|w| format!("Investigate with {}", w.display_name()))
                .collect();
        }
        self.steps.truncate(5);
        self
    }

    /// 计划的 Markdown 呈现（路由元数据与审批消息共用）
    pub fn to_markdown(&self) -> String {
        let mut text = String::from("## Investigation Plan\n\n");
        for (i, step) in self.steps.iter().enumerate() {
            text.push_str(&format!("**{}.** {}\n\n", i + 1, step));
        }
        text.push_str(&format!(
            "**Complexity:** {}\n",
            match self.complexity {
                Complexity::Simple => "Simple",
                Complexity::Complex => "Complex",
            }
        ));
        text.push_str(&format!(
            "**Auto-execute:** {}\n",
            if self.auto_execute { "Yes" } else { "No" }
        ));
        if !self.reasoning.is_empty() {
            text.push_str(&format!("**Reasoning:** {}\n", self.reasoning));
        }
        if !self.agents_sequence.is_empty() {
            let workers = self
                .agents_sequence
                .iter()
                .map(|w| w.display_name())
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!("**Workers involved:** {}\n", workers));
        }
        text
    }
}

/// 路由目标：下一个工作者，或终止信号
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    Worker(WorkerKind),
    Finish,
}

impl RouteTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTarget::Worker(kind) => kind.as_str(),
            RouteTarget::Finish => "FINISH",
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RouteTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RouteTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "FINISH" {
            return Ok(RouteTarget::Finish);
        }
        WorkerKind::parse(&s)
            .map(RouteTarget::Worker)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown route target '{}'", s)))
    }
}

/// 每轮的路由决策
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteDecision {
    pub next: RouteTarget,
    /// 为什么这么路由
    #[serde(default)]
    pub reasoning: String,
}
