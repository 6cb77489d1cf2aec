//! 记忆钩子：调查生命周期上的三处挂载点
//!
//! - 调查开始：按查询检索偏好 / 知识 / 历史摘要作为上下文
//! - 工作者回复后：机会式抽取偏好与基础设施知识并落库
//! - 调查结束：重建时间线与动作，持久化调查摘要
//!
//! 除调查摘要的会话前置条件外，钩子内的一切失败都是可恢复的：
//! 记日志、继续调查。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::extract::KnowledgeExtractor;
use crate::memory::records::{InvestigationSummary, MemoryKind, TimelineEntry};
use crate::memory::store::{MemoryError, MemoryStore};
use crate::workers::WorkerKind;

/// 调查开始时取回的记忆上下文；此后只在状态里随行，不再重取
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    pub user_preferences: Vec<serde_json::Value>,
    /// 基础设施知识，按发现它的工作者分组
    pub infrastructure_by_worker: HashMap<String, Vec<serde_json::Value>>,
    pub past_investigations: Vec<serde_json::Value>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.user_preferences.is_empty()
            && self.infrastructure_by_worker.is_empty()
            && self.past_investigations.is_empty()
    }

    pub fn knowledge_count(&self) -> usize {
        self.infrastructure_by_worker.values().map(Vec::len).sum()
    }
}

/// 检索上限（计划阶段）
#[derive(Clone, Copy, Debug)]
pub struct RetrievalLimits {
    pub max_preferences: usize,
    pub max_knowledge: usize,
    pub max_investigations: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            max_preferences: 5,
            max_knowledge: 50,
            max_investigations: 5,
        }
    }
}

/// 记忆钩子提供者：持有存储与抽取器
pub struct MemoryHookProvider {
    store: Arc<dyn MemoryStore>,
    extractor: Arc<dyn KnowledgeExtractor>,
    limits: RetrievalLimits,
}

impl MemoryHookProvider {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        extractor: Arc<dyn KnowledgeExtractor>,
        limits: RetrievalLimits,
    ) -> Self {
        Self {
            store,
            extractor,
            limits,
        }
    }

    pub fn store(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.store)
    }

    /// 调查开始：检索记忆上下文。基础设施知识跨全部工作者检索，
    /// 之后按命名空间里的工作者分组。
    pub async fn on_investigation_start(
        &self,
        query: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<MemoryContext, MemoryError> {
        let preferences = self
            .store
            .retrieve(
                MemoryKind::Preferences,
                user_id,
                query,
                self.limits.max_preferences,
            )
            .await?;

        // actor 为空串 = 跨全部工作者
        let all_knowledge = self
            .store
            .retrieve(MemoryKind::Infrastructure, "", query, self.limits.max_knowledge)
            .await?;

        let mut infrastructure_by_worker: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
        for record in &all_knowledge {
            let worker = MemoryKind::Infrastructure
                .actor_from_namespace(&record.namespace)
                .unwrap_or_else(|| "unknown".to_string());
            infrastructure_by_worker
                .entry(worker)
                .or_default()
                .push(record.payload.clone());
        }

        let investigations = self
            .store
            .retrieve(
                MemoryKind::Investigations,
                actor_id,
                query,
                self.limits.max_investigations,
            )
            .await?;

        let context = MemoryContext {
            user_preferences: preferences.into_iter().map(|r| r.payload).collect(),
            infrastructure_by_worker,
            past_investigations: investigations.into_iter().map(|r| r.payload).collect(),
        };

        tracing::info!(
            "Retrieved memory context: {} preferences, {} knowledge items from {} workers, {} past investigations",
            context.user_preferences.len(),
            context.knowledge_count(),
            context.infrastructure_by_worker.len(),
            context.past_investigations.len()
        );
        if context.is_empty() {
            tracing::info!("No relevant memories found - first interaction or a new topic");
        }

        Ok(context)
    }

    /// 工作者回复后：抽取偏好（所有工作者）与基础设施知识
    /// （仅 kubernetes/logs/metrics；性能基线仅 metrics）。
    /// 返回 (偏好条数, 知识条数)；单条写入失败记 warn 并继续。
    pub async fn on_worker_response(
        &self,
        worker: WorkerKind,
        response_text: &str,
        user_id: &str,
        session_id: &str,
    ) -> (usize, usize) {
        let mut saved_preferences = 0;
        for preference in
            self.extractor
                .extract_preferences(response_text, user_id, worker.as_str())
        {
            let payload = match serde_json::to_value(&preference) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Failed to encode preference: {}", e);
                    continue;
                }
            };
            match self
                .store
                .save_event(MemoryKind::Preferences, user_id, payload, session_id)
                .await
            {
                Ok(()) => saved_preferences += 1,
                Err(e) => tracing::warn!("Failed to save preference: {}", e),
            }
        }

        let mut saved_knowledge = 0;
        if worker.yields_infrastructure_knowledge() {
            let include_baselines = worker == WorkerKind::Metrics;
            for knowledge in
                self.extractor
                    .extract_knowledge(response_text, worker.as_str(), include_baselines)
            {
                let payload = match serde_json::to_value(&knowledge) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("Failed to encode knowledge: {}", e);
                        continue;
                    }
                };
                // 知识按发现它的工作者分区存储
                match self
                    .store
                    .save_event(
                        MemoryKind::Infrastructure,
                        worker.as_str(),
                        payload,
                        session_id,
                    )
                    .await
                {
                    Ok(()) => saved_knowledge += 1,
                    Err(e) => tracing::warn!("Failed to save knowledge: {}", e),
                }
            }
        }

        if saved_preferences + saved_knowledge > 0 {
            tracing::info!(
                "Captured {} preferences and {} knowledge items from {} response",
                saved_preferences,
                saved_knowledge,
                worker
            );
        }
        (saved_preferences, saved_knowledge)
    }

    /// 调查结束：构建并持久化调查摘要
    pub async fn on_investigation_complete(
        &self,
        incident_id: Option<&str>,
        query: &str,
        invoked: &[WorkerKind],
        results: &HashMap<WorkerKind, String>,
        final_response: &str,
        actor_id: &str,
        session_id: &str,
    ) -> Result<(), MemoryError> {
        let incident_id = incident_id
            .map(String::from)
            .unwrap_or_else(|| format!("incident-{}", uuid::Uuid::new_v4()));

        let summary = InvestigationSummary {
            incident_id: incident_id.clone(),
            query: query.to_string(),
            timeline: build_timeline(invoked, results),
            actions_taken: build_actions(invoked, results),
            resolution_status: self.extractor.classify_resolution(final_response),
            key_findings: self.extractor.extract_key_findings(final_response),
            timestamp: chrono::Utc::now(),
        };

        let payload = serde_json::to_value(&summary)
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        self.store
            .save_event(MemoryKind::Investigations, actor_id, payload, session_id)
            .await?;

        tracing::info!("Saved investigation summary for incident {}", incident_id);
        Ok(())
    }
}

/// 按调用顺序重建时间线
fn build_timeline(
    invoked: &[WorkerKind],
    results: &HashMap<WorkerKind, String>,
) -> Vec<TimelineEntry> {
    invoked
        .iter()
        .map(|worker| {
            let result = results.get(worker).map(String::as_str).unwrap_or("");
            // 按字符截断，定长字节切片会切进多字节字符
            let summary = match result.char_indices().nth(200) {
                Some((cut, _)) => format!("{}...", &result[..cut]),
                None => result.to_string(),
            };
            TimelineEntry {
                timestamp: chrono::Utc::now(),
                worker: worker.as_str().to_string(),
                action: format!("Executed {} worker", worker),
                result_summary: summary,
            }
        })
        .collect()
}

/// 调用清单 + 结果文本的关键词扫描
fn build_actions(invoked: &[WorkerKind], results: &HashMap<WorkerKind, String>) -> Vec<String> {
    let mut actions: Vec<String> = invoked
        .iter()
        .map(|w| format!("Invoked {} worker for investigation", w))
        .collect();

    for worker in invoked {
        if let Some(result) = results.get(worker) {
            let lower = result.to_lowercase();
            if lower.contains("error") || lower.contains("failed") {
                actions.push(format!("{} worker detected issues", worker));
            } else if lower.contains("found") || lower.contains("identified") {
                actions.push(format!("{} worker found relevant information", worker));
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::extract::RegexExtractor;
    use crate::memory::store::InMemoryStore;

    fn provider(store: Arc<InMemoryStore>) -> MemoryHookProvider {
        MemoryHookProvider::new(store, Arc::new(RegexExtractor::new()), RetrievalLimits::default())
    }

    #[tokio::test]
    async fn test_worker_response_captures_both_kinds() {
        let store = Arc::new(InMemoryStore::new());
        let hooks = provider(store.clone());

        let (prefs, knowledge) = hooks
            .on_worker_response(
                WorkerKind::Kubernetes,
                "checkout depends on redis; please escalate to ops@example.com",
                "alice",
                "sess-1",
            )
            .await;
        assert_eq!(prefs, 1);
        assert_eq!(knowledge, 1);

        let saved = store
            .list_events(MemoryKind::Infrastructure, Some("kubernetes_agent"))
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].payload["knowledge_data"]["depends_on"], "redis");
    }

    #[tokio::test]
    async fn test_runbooks_skips_infrastructure() {
        let store = Arc::new(InMemoryStore::new());
        let hooks = provider(store.clone());

        let (_, knowledge) = hooks
            .on_worker_response(
                WorkerKind::Runbooks,
                "checkout depends on redis",
                "alice",
                "sess-1",
            )
            .await;
        assert_eq!(knowledge, 0);
    }

    #[tokio::test]
    async fn test_investigation_start_groups_by_worker() {
        let store = Arc::new(InMemoryStore::new());
        let hooks = provider(store.clone());

        hooks
            .on_worker_response(
                WorkerKind::Kubernetes,
                "checkout depends on redis",
                "alice",
                "sess-1",
            )
            .await;
        hooks
            .on_worker_response(
                WorkerKind::Metrics,
                "baseline latency is 120.5 for checkout",
                "alice",
                "sess-1",
            )
            .await;

        let context = hooks
            .on_investigation_start("checkout latency baseline", "alice", "alice")
            .await
            .unwrap();
        assert_eq!(context.infrastructure_by_worker.len(), 2);
        assert!(context.infrastructure_by_worker.contains_key("kubernetes_agent"));
        assert!(context.infrastructure_by_worker.contains_key("metrics_agent"));
    }

    #[tokio::test]
    async fn test_complete_persists_summary() {
        let store = Arc::new(InMemoryStore::new());
        let hooks = provider(store.clone());

        let invoked = vec![WorkerKind::Kubernetes, WorkerKind::Logs];
        let mut results = HashMap::new();
        results.insert(WorkerKind::Kubernetes, "found 2 crashlooping pods".to_string());
        results.insert(WorkerKind::Logs, "error rate spiked at 10:03".to_string());

        hooks
            .on_investigation_complete(
                Some("incident-9"),
                "why is checkout failing",
                &invoked,
                &results,
                "Identified: checkout pod OOM kills. The issue has been resolved.",
                "alice",
                "sess-1",
            )
            .await
            .unwrap();

        let saved = store
            .list_events(MemoryKind::Investigations, Some("alice"))
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
        let summary: InvestigationSummary =
            serde_json::from_value(saved[0].payload.clone()).unwrap();
        assert_eq!(summary.incident_id, "incident-9");
        assert_eq!(summary.timeline.len(), 2);
        assert_eq!(summary.timeline[0].worker, "kubernetes_agent");
        assert_eq!(
            summary.resolution_status,
            crate::memory::records::ResolutionStatus::Completed
        );
        assert!(summary
            .actions_taken
            .iter()
            .any(|a| a.contains("detected issues")));
    }

    #[tokio::test]
    async fn test_complete_truncates_multibyte_result_on_char_boundary() {
        let store = Arc::new(InMemoryStore::new());
        let hooks = provider(store.clone());

        // 270 个汉字（810 字节），第 200 字节落在多字节字符中间
        let invoked = vec![WorkerKind::Logs];
        let mut results = HashMap::new();
        results.insert(WorkerKind::Logs, "内存不足，服务重启".repeat(30));

        hooks
            .on_investigation_complete(
                Some("incident-mb"),
                "为什么结账服务在重启",
                &invoked,
                &results,
                "结账服务内存超限",
                "alice",
                "sess-1",
            )
            .await
            .unwrap();

        let saved = store
            .list_events(MemoryKind::Investigations, Some("alice"))
            .await
            .unwrap();
        let summary: InvestigationSummary =
            serde_json::from_value(saved[0].payload.clone()).unwrap();
        let text = &summary.timeline[0].result_summary;
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), 203);
    }
}
