//! 领域工作者：固定枚举的调查执行者
//!
//! 编排器只认识这四类工作者；LLM 产出的序列里出现未知名字会在解析时被拒绝，
//! 不会被路由到。每个工作者接收当前调查请求，返回一个结果文本。

pub mod scripted;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::MemoryContext;

pub use scripted::{FailingWorker, ScriptedWorker};

/// 工作者枚举（固定集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    /// K8s 集群状态、Pod、部署
    #[serde(rename = "kubernetes_agent")]
    Kubernetes,
    /// 日志检索与错误模式
    #[serde(rename = "logs_agent")]
    Logs,
    /// 性能指标与资源用量
    #[serde(rename = "metrics_agent")]
    Metrics,
    /// 排障手册与操作流程
    #[serde(rename = "runbooks_agent")]
    Runbooks,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Kubernetes,
        WorkerKind::Logs,
        WorkerKind::Metrics,
        WorkerKind::Runbooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Kubernetes => "kubernetes_agent",
            WorkerKind::Logs => "logs_agent",
            WorkerKind::Metrics => "metrics_agent",
            WorkerKind::Runbooks => "runbooks_agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kubernetes_agent" => Some(WorkerKind::Kubernetes),
            "logs_agent" => Some(WorkerKind::Logs),
            "metrics_agent" => Some(WorkerKind::Metrics),
            "runbooks_agent" => Some(WorkerKind::Runbooks),
            _ => None,
        }
    }

    /// 展示名："kubernetes_agent" -> "Kubernetes Agent"
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 该工作者的回复是否参与基础设施知识抽取
    pub fn yields_infrastructure_knowledge(&self) -> bool {
        matches!(
            self,
            WorkerKind::Kubernetes | WorkerKind::Logs | WorkerKind::Metrics
        )
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作者调用错误
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    #[error("Worker execution failed: {0}")]
    ExecutionFailed(String),
}

/// 传给工作者的调查请求（只读视图）
pub struct WorkerRequest<'a> {
    pub query: &'a str,
    pub memory_context: &'a MemoryContext,
    /// 之前步骤的结果，按工作者归档
    pub prior_results: &'a HashMap<WorkerKind, String>,
}

/// 工作者报告：结果文本
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub content: String,
}

/// 工作者接口：每类领域工作者实现一次调用
#[async_trait]
pub trait Worker: Send + Sync {
    async fn invoke(&self, request: WorkerRequest<'_>) -> Result<WorkerReport, WorkerError>;
}

/// 工作者注册表：kind -> 实现
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerKind, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: WorkerKind, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(kind, worker);
        self
    }

    pub fn get(&self, kind: WorkerKind) -> Option<Arc<dyn Worker>> {
        self.workers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
