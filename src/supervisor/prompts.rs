//! 提示词：内置默认 + 文件覆盖
//!
//! 系统提示词可放在 config/prompts/supervisor.txt；文件不存在或读取失败时
//! 使用内置默认，绝不因提示词文件问题中断调查。

use std::path::Path;

use crate::memory::MemoryContext;

/// 内置的编排器系统提示词
pub const DEFAULT_SUPERVISOR_PROMPT: &str = "\
You are the Supervisor orchestrating a team of specialized SRE workers.

Your team consists of:
1. Kubernetes Agent (kubernetes_agent) - cluster operations, pod status, deployments, resource monitoring
2. Logs Agent (logs_agent) - log analysis, pattern search, error identification
3. Metrics Agent (metrics_agent) - performance, resource usage, availability
4. Runbooks Agent (runbooks_agent) - troubleshooting guides and operational procedures

Your responsibilities:
- Analyze incoming queries and decide which workers should handle them
- Route to the most appropriate worker based on the query content
- Aggregate responses when multiple workers are involved
- Provide clear, actionable responses

Routing guidelines:
- Kubernetes/infrastructure issues -> kubernetes_agent
- Log analysis or error investigation -> logs_agent
- Performance/metrics questions -> metrics_agent
- Procedures/troubleshooting guides -> runbooks_agent
- Complex issues spanning multiple domains -> multiple workers in sequence";

/// 聚合兜底时的系统提示词
pub const AGGREGATION_SYSTEM_PROMPT: &str =
    "You are an expert at presenting technical investigation results clearly and professionally.";

/// 读取系统提示词文件，失败时退回内置默认
pub fn load_supervisor_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => DEFAULT_SUPERVISOR_PROMPT.to_string(),
        Err(e) => {
            if path.exists() {
                tracing::warn!("Could not read supervisor prompt file: {}", e);
            }
            DEFAULT_SUPERVISOR_PROMPT.to_string()
        }
    }
}

/// 计划阶段的完整提示词：系统提示 + 查询 + 记忆上下文 + 结构化输出要求
pub fn build_planning_prompt(system_prompt: &str, query: &str, memory_context_text: &str) -> String {
    format!(
        "{system_prompt}\n\n\
         User's query: {query}\n\
         {memory_context_text}\n\
         Create a simple, focused investigation plan with 2-3 steps maximum. Consider:\n\
         - Start with the most relevant single worker\n\
         - Add one follow-up worker only if clearly needed\n\
         - Keep it simple - most queries need only 1-2 workers\n\
         - Mark as simple unless it involves production changes or multiple domains\n\
         - Take into account any user preferences and past investigation patterns shown above\n\n\
         Return a JSON object with fields: steps (list of strings), agents_sequence \
         (list of worker names), complexity (\"simple\" or \"complex\"), auto_execute \
         (boolean), reasoning (string)."
    )
}

/// 将记忆上下文格式化进提示词；无内容时返回空串
pub fn format_memory_context(context: &MemoryContext) -> String {
    let mut text = String::new();

    if !context.user_preferences.is_empty() {
        text.push_str(&format!(
            "\nRelevant User Preferences:\n{}\n",
            serde_json::to_string_pretty(&context.user_preferences).unwrap_or_default()
        ));
    }

    if !context.infrastructure_by_worker.is_empty() {
        text.push_str("\nRelevant Infrastructure Knowledge (organized by worker):\n");
        for (worker, items) in &context.infrastructure_by_worker {
            text.push_str(&format!(
                "\n  From {} ({} items):\n{}\n",
                worker,
                items.len(),
                serde_json::to_string_pretty(items).unwrap_or_default()
            ));
        }
    }

    if !context.past_investigations.is_empty() {
        text.push_str(&format!(
            "\nSimilar Past Investigations:\n{}\n",
            serde_json::to_string_pretty(&context.past_investigations).unwrap_or_default()
        ));
    }

    text
}

/// 聚合兜底的用户提示词
pub fn build_aggregation_prompt(
    query: &str,
    agent_results_json: &str,
    plan_steps_json: Option<&str>,
    current_step: usize,
    total_steps: usize,
    user_preferences_json: &str,
) -> String {
    let mut prompt = format!(
        "Summarize the findings of this investigation for the user.\n\n\
         Query: {query}\n\nWorker results:\n{agent_results_json}\n"
    );
    if let Some(plan) = plan_steps_json {
        prompt.push_str(&format!(
            "\nInvestigation plan (step {current_step} of {total_steps}):\n{plan}\n"
        ));
    }
    if !user_preferences_json.is_empty() {
        prompt.push_str(&format!(
            "\nApply these user preferences when relevant:\n{user_preferences_json}\n"
        ));
    }
    prompt.push_str("\nPresent the key findings, their likely cause, and recommended next steps.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_prompt_fallback() {
        let prompt = load_supervisor_prompt(Path::new("does/not/exist.txt"));
        assert_eq!(prompt, DEFAULT_SUPERVISOR_PROMPT);
    }

    #[test]
    fn test_load_prompt_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.txt");
        std::fs::write(&path, "custom prompt\n").unwrap();
        assert_eq!(load_supervisor_prompt(&path), "custom prompt");
    }

    #[test]
    fn test_format_memory_context_empty() {
        assert_eq!(format_memory_context(&MemoryContext::default()), "");
    }

    #[test]
    fn test_format_memory_context_sections() {
        let mut context = MemoryContext::default();
        context
            .user_preferences
            .push(serde_json::json!({"preference_type": "escalation"}));
        context.infrastructure_by_worker.insert(
            "kubernetes_agent".to_string(),
            vec![serde_json::json!({"knowledge_type": "dependency"})],
        );
        let text = format_memory_context(&context);
        assert!(text.contains("Relevant User Preferences"));
        assert!(text.contains("From kubernetes_agent (1 items)"));
        assert!(!text.contains("Similar Past Investigations"));
    }
}
