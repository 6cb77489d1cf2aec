//! 调查主循环
//!
//! Supervisor 把路由器、聚合器、工作者注册表与记忆钩子接成一条
//! 完整的调查流水线：route -> 调用工作者 -> 记录结果 -> 再 route，
//! 直到 FINISH 后聚合。取消令牌随时可中断，单个工作者失败不终止
//! 调查，失败文本照样计入结果。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::LlmClient;
use crate::memory::{ConversationManager, Message, MemoryHookProvider, Role};
use crate::supervisor::aggregator::{MarkdownFormatter, ResponseAggregator, ResponseFormatter};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::plan::RouteTarget;
use crate::supervisor::planner::{PlanBuilder, SUPERVISOR_DISPLAY_NAME};
use crate::supervisor::router::Router;
use crate::supervisor::state::{InvestigationRequest, InvestigationState};
use crate::workers::{WorkerRegistry, WorkerRequest};

/// 记忆相关协作者，整体可选
pub struct MemoryHandles {
    pub hooks: MemoryHookProvider,
    pub conversation: ConversationManager,
}

/// 调查编排器
pub struct Supervisor {
    llm: Arc<dyn LlmClient>,
    router: Router,
    aggregator: ResponseAggregator,
    workers: WorkerRegistry,
    memory: Option<MemoryHandles>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        workers: WorkerRegistry,
    ) -> Self {
        Self {
            llm: llm.clone(),
            router: Router::new(PlanBuilder::new(llm.clone(), system_prompt)),
            aggregator: ResponseAggregator::new(llm, Box::new(MarkdownFormatter)),
            workers,
            memory: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_memory(mut self, handles: MemoryHandles) -> Self {
        self.memory = Some(handles);
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn ResponseFormatter>) -> Self {
        self.aggregator = ResponseAggregator::new(self.llm.clone(), formatter);
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// 完整跑一次调查：构造状态并驱动到终止
    pub async fn investigate(
        &self,
        request: InvestigationRequest,
    ) -> Result<InvestigationState, SupervisorError> {
        let mut state = InvestigationState::from_request(request)?;
        // 记忆启用时会话是硬前提，入口处即拒绝
        if self.memory.is_some() {
            state.require_session()?;
        }
        self.run(&mut state).await?;
        Ok(state)
    }

    /// 用户放行挂起的计划后继续执行
    pub async fn resume(&self, state: &mut InvestigationState) -> Result<(), SupervisorError> {
        state.approve_plan();
        self.run(state).await
    }

    /// 驱动状态机直到 FINISH，随时响应取消
    pub async fn run(&self, state: &mut InvestigationState) -> Result<(), SupervisorError> {
        let hooks = self.memory.as_ref().map(|m| &m.hooks);
        let conversation = self.memory.as_ref().map(|m| &m.conversation);

        loop {
            let decision = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(SupervisorError::Cancelled),
                decision = self.router.route(state, hooks, conversation) => decision?,
            };
            tracing::debug!(next = %decision.next, reasoning = %decision.reasoning, "路由决策");
            state.next = Some(decision.next);

            let kind = match decision.next {
                RouteTarget::Finish => {
                    self.aggregator.aggregate(state, hooks, conversation).await?;
                    return Ok(());
                }
                RouteTarget::Worker(kind) => kind,
            };

            let worker = self
                .workers
                .get(kind)
                .ok_or_else(|| SupervisorError::WorkerNotRegistered(kind.to_string()))?;

            let outcome = {
                let request = WorkerRequest {
                    query: &state.current_query,
                    memory_context: &state.memory_context,
                    prior_results: &state.agent_results,
                };
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Err(SupervisorError::Cancelled),
                    outcome = worker.invoke(request) => outcome,
                }
            };

            // 工作者失败降级为结果文本，调查继续
            let text = match outcome {
                Ok(report) => report.content,
                Err(err) => {
                    tracing::error!(worker = %kind, error = %err, "工作者调用失败");
                    format!("{} could not complete this step: {}", kind.display_name(), err)
                }
            };

            state.agent_results.insert(kind, text.clone());
            state.agents_invoked.push(kind);
            state
                .messages
                .push(Message::assistant(format!("[{}] {}", kind.display_name(), text)));

            if let Some(memory) = &self.memory {
                let (preferences, knowledge) = memory
                    .hooks
                    .on_worker_response(kind, &text, &state.user_id, &state.session_id)
                    .await;
                tracing::debug!(worker = %kind, preferences, knowledge, "工作者回复的记忆抽取");
                if let Err(err) = memory
                    .conversation
                    .store_batch(
                        &[(format!("[Agent: {}]\n{}", kind.display_name(), text), Role::Assistant)],
                        &state.user_id,
                        &state.session_id,
                        SUPERVISOR_DISPLAY_NAME,
                    )
                    .await
                {
                    tracing::warn!(error = %err, "工作者回复对话落盘失败");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::{InMemoryStore, MemoryKind, MemoryStore, RegexExtractor, RetrievalLimits};
    use crate::workers::{FailingWorker, ScriptedWorker, WorkerKind};

    fn simple_plan_reply() -> String {
        r#"{"steps": ["check pods", "check logs"],
            "agents_sequence": ["kubernetes_agent", "logs_agent"],
            "complexity": "simple", "auto_execute": true,
            "reasoning": "pods then logs"}"#
            .to_string()
    }

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new()
            .register(
                WorkerKind::Kubernetes,
                Arc::new(ScriptedWorker::fixed("3 pods CrashLoopBackOff")),
            )
            .register(
                WorkerKind::Logs,
                Arc::new(ScriptedWorker::fixed("OOMKilled entries in last hour")),
            )
    }

    #[tokio::test]
    async fn test_full_investigation_without_memory() {
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let supervisor = Supervisor::new(llm, "system", registry());

        let state = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-1",
            ))
            .await
            .unwrap();

        assert_eq!(
            state.agents_invoked,
            vec![WorkerKind::Kubernetes, WorkerKind::Logs]
        );
        let response = state.final_response.unwrap();
        assert!(response.contains("CrashLoopBackOff"));
        assert!(response.contains("OOMKilled"));
    }

    #[tokio::test]
    async fn test_worker_failure_does_not_abort() {
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let workers = WorkerRegistry::new()
            .register(WorkerKind::Kubernetes, Arc::new(FailingWorker))
            .register(
                WorkerKind::Logs,
                Arc::new(ScriptedWorker::fixed("logs look clean")),
            );
        let supervisor = Supervisor::new(llm, "system", workers);

        let state = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-1",
            ))
            .await
            .unwrap();

        assert!(state.agent_results[&WorkerKind::Kubernetes]
            .contains("could not complete this step"));
        assert!(state.agent_results[&WorkerKind::Logs].contains("logs look clean"));
    }

    #[tokio::test]
    async fn test_unregistered_worker_is_hard_error() {
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let workers = WorkerRegistry::new().register(
            WorkerKind::Kubernetes,
            Arc::new(ScriptedWorker::fixed("ok")),
        );
        let supervisor = Supervisor::new(llm, "system", workers);

        let err = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::WorkerNotRegistered(name) if name == "logs_agent"));
    }

    #[tokio::test]
    async fn test_missing_session_rejected_when_memory_enabled() {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let supervisor = Supervisor::new(llm, "system", registry()).with_memory(MemoryHandles {
            hooks: MemoryHookProvider::new(
                store.clone(),
                Arc::new(RegexExtractor::new()),
                RetrievalLimits::default(),
            ),
            conversation: ConversationManager::new(store),
        });

        let err = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::MissingSessionId));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_investigation() {
        let token = CancellationToken::new();
        token.cancel();
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let supervisor = Supervisor::new(llm, "system", registry()).with_shutdown(token);

        let err = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Cancelled));
    }

    #[tokio::test]
    async fn test_memory_side_effects_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::scripted(vec![simple_plan_reply()]));
        let supervisor = Supervisor::new(llm, "system", registry()).with_memory(MemoryHandles {
            hooks: MemoryHookProvider::new(
                store.clone(),
                Arc::new(RegexExtractor::new()),
                RetrievalLimits::default(),
            ),
            conversation: ConversationManager::new(store.clone()),
        });

        supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-1",
            ))
            .await
            .unwrap();

        // 调查总结 + 对话轮次都已落盘
        let investigations = store
            .list_events(MemoryKind::Investigations, Some("alice"))
            .await
            .unwrap();
        assert_eq!(investigations.len(), 1);
        let conversations = store
            .list_events(MemoryKind::Conversations, Some("alice"))
            .await
            .unwrap();
        assert!(conversations.len() >= 3);
    }
}
