//! 脚本化工作者：按预设回复依次出队（测试与离线演示用）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::workers::{Worker, WorkerError, WorkerReport, WorkerRequest};

/// 每次调用弹出一条预设回复；队列耗尽后回退到固定文本
pub struct ScriptedWorker {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedWorker {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: "No further findings.".to_string(),
        }
    }

    /// 永远返回同一条回复
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply.into(),
        }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, _request: WorkerRequest<'_>) -> Result<WorkerReport, WorkerError> {
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(WorkerReport { content })
    }
}

/// 固定返回错误的工作者（故障注入测试用）
pub struct FailingWorker;

#[async_trait]
impl Worker for FailingWorker {
    async fn invoke(&self, _request: WorkerRequest<'_>) -> Result<WorkerReport, WorkerError> {
        Err(WorkerError::Unavailable("backend not reachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryContext;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let worker = ScriptedWorker::new(vec!["first".into(), "second".into()]);
        let ctx = MemoryContext::default();
        let prior = HashMap::new();
        let request = |q| WorkerRequest {
            query: q,
            memory_context: &ctx,
            prior_results: &prior,
        };

        assert_eq!(worker.invoke(request("q")).await.unwrap().content, "first");
        assert_eq!(worker.invoke(request("q")).await.unwrap().content, "second");
        // 队列耗尽后走回退文本
        assert_eq!(
            worker.invoke(request("q")).await.unwrap().content,
            "No further findings."
        );
    }
}
