//! 响应聚合器
//!
//! 调查终止时把各工作者的结果汇成呈现给用户的最终答复。
//! 三级降级：模板格式化器 -> LLM 摘要 -> 纯文本拼接，任何一级失败
//! 都记录日志后落到下一级，绝不让格式化问题毁掉一次调查。
//! 挂起待审批的计划在此生成审批提示，并跳过记忆落盘。

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{ConversationManager, MemoryHookProvider, Role};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::prompts::{build_aggregation_prompt, AGGREGATION_SYSTEM_PROMPT};
use crate::supervisor::state::InvestigationState;
use crate::workers::WorkerKind;

/// 格式化失败
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("模板渲染失败: {0}")]
    Template(String),
}

/// 最终答复的格式化策略，可替换
pub trait ResponseFormatter: Send + Sync {
    /// 按工作者结果渲染调查总结
    fn format_results(&self, state: &InvestigationState) -> Result<String, FormatError>;

    /// 渲染计划审批提示
    fn format_approval(&self, state: &InvestigationState) -> Result<String, FormatError> {
        Ok(default_approval_message(&state.metadata.plan_text))
    }
}

fn default_approval_message(plan_text: &str) -> String {
    format!(
        "I've prepared an investigation plan:\n\n{plan_text}\n\
         Would you like me to:\n\
         1. **Proceed** with this plan\n\
         2. **Modify** the plan\n\
         3. Answer a **question** about the approach\n"
    )
}

/// 默认 Markdown 格式化器
pub struct MarkdownFormatter;

impl ResponseFormatter for MarkdownFormatter {
    fn format_results(&self, state: &InvestigationState) -> Result<String, FormatError> {
        if state.agent_results.is_empty() {
            return Err(FormatError::Template("no agent results".to_string()));
        }
        let mut out = format!(
            "# Investigation Results\n\n**Query:** {}\n\n## Findings\n\n",
            state.current_query
        );
        // 按调用顺序输出，未记录顺序的结果排在最后
        let mut ordered: Vec<WorkerKind> = state.agents_invoked.clone();
        for kind in state.agent_results.keys() {
            if !ordered.contains(kind) {
                ordered.push(*kind);
            }
        }
        for kind in ordered {
            if let Some(text) = state.agent_results.get(&kind) {
                out.push_str(&format!("### {}\n\n{}\n\n", kind.display_name(), text));
            }
        }
        if let Some(plan) = &state.metadata.plan {
            out.push_str(&format!(
                "---\n*Investigation plan executed: {} of {} steps.*\n",
                state.metadata.plan_step.min(plan.agents_sequence.len()),
                plan.agents_sequence.len()
            ));
        }
        Ok(out)
    }
}

/// 聚合器：格式化器优先，LLM 与纯文本依次兜底
pub struct ResponseAggregator {
    llm: Arc<dyn LlmClient>,
    formatter: Box<dyn ResponseFormatter>,
}

impl ResponseAggregator {
    pub fn new(llm: Arc<dyn LlmClient>, formatter: Box<dyn ResponseFormatter>) -> Self {
        Self { llm, formatter }
    }

    /// 生成最终答复并写入状态；非挂起路径落盘对话与调查记忆
    pub async fn aggregate(
        &self,
        state: &mut InvestigationState,
        hooks: Option<&MemoryHookProvider>,
        conversation: Option<&ConversationManager>,
    ) -> Result<(), SupervisorError> {
        // 挂起待审批：只产出审批提示，不落盘
        if state.metadata.plan_pending_approval {
            let message = self
                .formatter
                .format_approval(state)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "审批提示渲染失败，使用默认模板");
                    default_approval_message(&state.metadata.plan_text)
                });
            state.final_response = Some(message.clone());
            state.messages.push(crate::memory::Message::assistant(message));
            return Ok(());
        }

        // 没有任何工作者结果：只答复，不归档空时间线
        if state.agent_results.is_empty() {
            let message = "No worker responses to aggregate.".to_string();
            state.final_response = Some(message.clone());
            state.messages.push(crate::memory::Message::assistant(message));
            return Ok(());
        }

        let response = self.render_results(state).await;

        state.final_response = Some(response.clone());
        state
            .messages
            .push(crate::memory::Message::assistant(response.clone()));

        self.persist(state, &response, hooks, conversation).await;
        Ok(())
    }

    async fn render_results(&self, state: &InvestigationState) -> String {
        match self.formatter.format_results(state) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "模板格式化失败，降级到 LLM 摘要");
                match self.summarize_with_llm(state).await {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(error = %err, "LLM 摘要失败，降级到纯文本拼接");
                        plain_join(state)
                    }
                }
            }
        }
    }

    async fn summarize_with_llm(&self, state: &InvestigationState) -> Result<String, LlmError> {
        let results: serde_json::Map<String, serde_json::Value> = state
            .agent_results
            .iter()
            .map(|(kind, text)| (kind.to_string(), serde_json::Value::String(text.clone())))
            .collect();
        let results_json = serde_json::Value::Object(results).to_string();

        let plan_steps_json = state
            .metadata
            .plan
            .as_ref()
            .map(|plan| serde_json::json!(plan.steps).to_string());
        let total_steps = state
            .metadata
            .plan
            .as_ref()
            .map(|plan| plan.agents_sequence.len())
            .unwrap_or(0);
        let preferences_json = if state.memory_context.user_preferences.is_empty() {
            String::new()
        } else {
            serde_json::json!(state.memory_context.user_preferences).to_string()
        };

        // 执行完毕时游标等于序列长度，步号封顶在总步数
        let prompt = build_aggregation_prompt(
            &state.current_query,
            &results_json,
            plan_steps_json.as_deref(),
            (state.metadata.plan_step + 1).min(total_steps),
            total_steps,
            &preferences_json,
        );
        let messages = vec![
            crate::memory::Message::system(AGGREGATION_SYSTEM_PROMPT),
            crate::memory::Message::user(prompt),
        ];
        self.llm.complete(&messages).await
    }

    /// 对话与调查记忆落盘；失败记日志，不影响已生成的答复
    async fn persist(
        &self,
        state: &InvestigationState,
        response: &str,
        hooks: Option<&MemoryHookProvider>,
        conversation: Option<&ConversationManager>,
    ) {
        if let Some(conversation) = conversation {
            if let Err(err) = conversation
                .store_batch(
                    &[(response.to_string(), Role::Assistant)],
                    &state.user_id,
                    &state.session_id,
                    crate::supervisor::planner::SUPERVISOR_DISPLAY_NAME,
                )
                .await
            {
                tracing::warn!(error = %err, "最终答复对话落盘失败");
            }
        }
        if let Some(hooks) = hooks {
            if let Err(err) = hooks
                .on_investigation_complete(
                    state.incident_id.as_deref(),
                    &state.current_query,
                    &state.agents_invoked,
                    &state.agent_results,
                    response,
                    &state.user_id,
                    &state.session_id,
                )
                .await
            {
                tracing::warn!(error = %err, "调查总结落盘失败");
            }
        }
    }
}

/// 最后一级兜底：直接拼接工作者结果
fn plain_join(state: &InvestigationState) -> String {
    let mut out = format!("Investigation results for: {}\n\n", state.current_query);
    for kind in &state.agents_invoked {
        if let Some(text) = state.agent_results.get(kind) {
            out.push_str(&format!("{}:\n{}\n\n", kind.display_name(), text));
        }
    }
    for (kind, text) in &state.agent_results {
        if !state.agents_invoked.contains(kind) {
            out.push_str(&format!("{}:\n{}\n\n", kind.display_name(), text));
        }
    }
    out.trim_end().to_string()
}
