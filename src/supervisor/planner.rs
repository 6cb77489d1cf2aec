//! 计划构建：查询 + 记忆上下文 -> 调查计划
//!
//! 记忆检索失败不致命：记日志、用空上下文继续。产出的计划先做归一化
//! （steps 截断 / 兜底），再把查询与计划写入对话记忆（启用时）。

use std::sync::Arc;

use crate::llm::{complete_structured, LlmClient};
use crate::memory::{ConversationManager, MemoryHookProvider, Message, Role};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::plan::InvestigationPlan;
use crate::supervisor::prompts;
use crate::supervisor::state::InvestigationState;

/// 编排器的展示名（对话记忆里标注消息来源）
pub const SUPERVISOR_DISPLAY_NAME: &str = "Supervisor Agent";

/// 计划构建器：持有 LLM 与系统提示词
pub struct PlanBuilder {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl PlanBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 为当前查询构建调查计划；检索到的记忆上下文写入 state 随行
    pub async fn build(
        &self,
        state: &mut InvestigationState,
        hooks: Option<&MemoryHookProvider>,
        conversation: Option<&ConversationManager>,
    ) -> Result<InvestigationPlan, SupervisorError> {
        let memory_context_text = match hooks {
            Some(hooks) => {
                // 会话缺失是硬性前置条件失败，必须上抛而不是静默串命名空间
                let _session = state.require_session()?;
                match hooks
                    .on_investigation_start(&state.current_query, &state.user_id, &state.user_id)
                    .await
                {
                    Ok(context) => {
                        let text = prompts::format_memory_context(&context);
                        state.memory_context = context;
                        text
                    }
                    Err(e) => {
                        tracing::error!("Failed to retrieve memory context: {}", e);
                        String::new()
                    }
                }
            }
            None => String::new(),
        };

        let planning_prompt = prompts::build_planning_prompt(
            &self.system_prompt,
            &state.current_query,
            &memory_context_text,
        );

        let plan: InvestigationPlan = complete_structured(
            self.llm.as_ref(),
            &[
                Message::system(planning_prompt),
                Message::user(state.current_query.clone()),
            ],
        )
        .await?;
        let plan = plan.normalized();

        tracing::info!(
            "Created investigation plan: {} steps, complexity: {:?}",
            plan.steps.len(),
            plan.complexity
        );

        if let Some(conversation) = conversation {
            let to_store = vec![
                (state.current_query.clone(), Role::User),
                (
                    format!(
                        "[Agent: {}]\nInvestigation Plan:\n{}",
                        SUPERVISOR_DISPLAY_NAME,
                        plan.to_markdown()
                    ),
                    Role::Assistant,
                ),
            ];
            let session = state.require_session()?;
            if let Err(e) = conversation
                .store_batch(&to_store, &state.user_id, session, SUPERVISOR_DISPLAY_NAME)
                .await
            {
                tracing::error!("Failed to store planning conversation: {}", e);
            }
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::{InMemoryStore, MemoryError, MemoryKind, MemoryRecord, MemoryStore, RegexExtractor, RetrievalLimits};
    use crate::supervisor::state::InvestigationRequest;
    use crate::workers::WorkerKind;
    use async_trait::async_trait;

    fn plan_reply() -> String {
        r#"{"steps": ["check pods", "check logs"],
            "agents_sequence": ["kubernetes_agent", "logs_agent"],
            "complexity": "simple", "auto_execute": true,
            "reasoning": "start with pods"}"#
            .to_string()
    }

    fn state() -> InvestigationState {
        InvestigationState::from_request(InvestigationRequest::new(
            "why is checkout failing",
            "alice",
            "sess-1",
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_without_memory() {
        let builder = PlanBuilder::new(
            Arc::new(MockLlmClient::scripted(vec![plan_reply()])),
            "system",
        );
        let mut state = state();
        let plan = builder.build(&mut state, None, None).await.unwrap();
        assert_eq!(plan.agents_sequence, vec![WorkerKind::Kubernetes, WorkerKind::Logs]);
        assert!(plan.auto_execute);
        assert!(state.memory_context.is_empty());
    }

    /// 检索一律报错的存储（故障注入）
    struct BrokenStore;

    #[async_trait]
    impl MemoryStore for BrokenStore {
        async fn save_event(
            &self,
            _kind: MemoryKind,
            _actor_id: &str,
            _payload: serde_json::Value,
            _session_id: &str,
        ) -> Result<(), MemoryError> {
            Err(MemoryError::Backend("down".into()))
        }

        async fn retrieve(
            &self,
            _kind: MemoryKind,
            _actor_id: &str,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<MemoryRecord>, MemoryError> {
            Err(MemoryError::Backend("down".into()))
        }

        async fn list_events(
            &self,
            _kind: MemoryKind,
            _actor_id: Option<&str>,
        ) -> Result<Vec<MemoryRecord>, MemoryError> {
            Err(MemoryError::Backend("down".into()))
        }

        async fn clear(
            &self,
            _kind: MemoryKind,
            _actor_id: Option<&str>,
        ) -> Result<usize, MemoryError> {
            Err(MemoryError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_memory_failure_is_nonfatal() {
        let hooks = MemoryHookProvider::new(
            Arc::new(BrokenStore),
            Arc::new(RegexExtractor::new()),
            RetrievalLimits::default(),
        );
        let builder = PlanBuilder::new(
            Arc::new(MockLlmClient::scripted(vec![plan_reply()])),
            "system",
        );
        let mut state = state();
        let plan = builder.build(&mut state, Some(&hooks), None).await.unwrap();
        assert_eq!(plan.steps.len(), 2);
        // 上下文保持为空
        assert!(state.memory_context.is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_is_hard_error() {
        let hooks = MemoryHookProvider::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(RegexExtractor::new()),
            RetrievalLimits::default(),
        );
        let builder = PlanBuilder::new(Arc::new(MockLlmClient::new()), "system");
        let mut state = state();
        state.session_id = String::new();
        let err = builder.build(&mut state, Some(&hooks), None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::MissingSessionId));
    }

    #[tokio::test]
    async fn test_conversation_side_effect() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = ConversationManager::new(store.clone());
        let builder = PlanBuilder::new(
            Arc::new(MockLlmClient::scripted(vec![plan_reply()])),
            "system",
        );
        let mut state = state();
        builder
            .build(&mut state, None, Some(&conversation))
            .await
            .unwrap();
        let events = store
            .list_events(MemoryKind::Conversations, Some("alice"))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
    }
}
