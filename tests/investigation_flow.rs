//! 调查全流程集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use triage::llm::MockLlmClient;
    use triage::memory::{
        ConversationManager, InMemoryStore, MemoryHookProvider, MemoryKind, MemoryStore,
        RegexExtractor, RetrievalLimits,
    };
    use triage::supervisor::{
        FormatError, InvestigationRequest, InvestigationState, MemoryHandles, ResponseFormatter,
        Supervisor, SupervisorError,
    };
    use triage::workers::{ScriptedWorker, WorkerKind, WorkerRegistry};

    fn checkout_plan() -> String {
        r#"{"steps": ["Check pod status of checkout-service", "Search recent error logs"],
            "agents_sequence": ["kubernetes_agent", "logs_agent"],
            "complexity": "simple", "auto_execute": true,
            "reasoning": "Pod health first, then the error logs"}"#
            .to_string()
    }

    fn complex_plan() -> String {
        r#"{"steps": ["Check pod status", "Search error logs", "Compare metrics to baseline"],
            "agents_sequence": ["kubernetes_agent", "logs_agent", "metrics_agent"],
            "complexity": "complex", "auto_execute": false,
            "reasoning": "Spans infrastructure, logs and metrics"}"#
            .to_string()
    }

    fn checkout_registry() -> WorkerRegistry {
        WorkerRegistry::new()
            .register(
                WorkerKind::Kubernetes,
                Arc::new(ScriptedWorker::fixed(
                    "checkout-service has 3 pods in CrashLoopBackOff, reason OOMKilled",
                )),
            )
            .register(
                WorkerKind::Logs,
                Arc::new(ScriptedWorker::fixed(
                    "OutOfMemoryError repeating since 14:02; escalate to ops@example.com \
                     if it persists",
                )),
            )
            .register(
                WorkerKind::Metrics,
                Arc::new(ScriptedWorker::fixed(
                    "memory usage normal value is 300Mi, currently 510Mi",
                )),
            )
    }

    fn memory_handles(store: Arc<InMemoryStore>) -> MemoryHandles {
        MemoryHandles {
            hooks: MemoryHookProvider::new(
                store.clone(),
                Arc::new(RegexExtractor::new()),
                RetrievalLimits::default(),
            ),
            conversation: ConversationManager::new(store),
        }
    }

    #[tokio::test]
    async fn test_checkout_investigation_end_to_end() {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::scripted(vec![checkout_plan()]));
        let supervisor = Supervisor::new(llm, "system", checkout_registry())
            .with_memory(memory_handles(store.clone()));

        let state = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-checkout",
            ))
            .await
            .unwrap();

        // 计划按序执行：kubernetes 先于 logs
        assert_eq!(
            state.agents_invoked,
            vec![WorkerKind::Kubernetes, WorkerKind::Logs]
        );
        assert_eq!(state.metadata.plan_step, 2);

        let response = state.final_response.unwrap();
        assert!(response.contains("CrashLoopBackOff"));
        assert!(response.contains("OutOfMemoryError"));

        // Logs 回复里的升级联系人被抽成用户偏好
        let preferences = store
            .list_events(MemoryKind::Preferences, Some("alice"))
            .await
            .unwrap();
        assert!(preferences.iter().any(|record| {
            record.payload["preference_value"]["contact"] == "ops@example.com"
        }));

        // 调查摘要归档在发起者名下
        let investigations = store
            .list_events(MemoryKind::Investigations, Some("alice"))
            .await
            .unwrap();
        assert_eq!(investigations.len(), 1);
    }

    #[tokio::test]
    async fn test_complex_plan_pauses_then_resumes_after_approval() {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::scripted(vec![complex_plan()]));
        let supervisor = Supervisor::new(llm, "system", checkout_registry())
            .with_memory(memory_handles(store.clone()));

        let mut state = supervisor
            .investigate(InvestigationRequest::new(
                "Checkout is down and metrics look strange",
                "alice",
                "sess-approval",
            ))
            .await
            .unwrap();

        // 第一轮停在审批，一个工作者都没跑
        assert!(state.metadata.plan_pending_approval);
        assert!(state.agents_invoked.is_empty());
        let approval = state.final_response.clone().unwrap();
        assert!(approval.contains("Proceed"));
        // 未执行就不归档调查
        assert!(store
            .list_events(MemoryKind::Investigations, None)
            .await
            .unwrap()
            .is_empty());

        // 放行后从第一步跑到底
        supervisor.resume(&mut state).await.unwrap();
        assert_eq!(
            state.agents_invoked,
            vec![
                WorkerKind::Kubernetes,
                WorkerKind::Logs,
                WorkerKind::Metrics
            ]
        );
        assert!(!state.metadata.plan_pending_approval);
        assert!(state.final_response.unwrap().contains("CrashLoopBackOff"));
        assert_eq!(
            store
                .list_events(MemoryKind::Investigations, None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancelled_investigation_produces_no_summary() {
        let token = CancellationToken::new();
        token.cancel();
        let llm = Arc::new(MockLlmClient::scripted(vec![checkout_plan()]));
        let supervisor =
            Supervisor::new(llm, "system", checkout_registry()).with_shutdown(token);

        let err = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-cancel",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Cancelled));
    }

    struct BrokenFormatter;

    impl ResponseFormatter for BrokenFormatter {
        fn format_results(&self, _state: &InvestigationState) -> Result<String, FormatError> {
            Err(FormatError::Template("render failed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_formatter_failure_falls_back_to_llm_summary() {
        // 第一条回复喂计划，第二条喂聚合兜底
        let llm = Arc::new(MockLlmClient::scripted(vec![
            checkout_plan(),
            "Summary: checkout pods are OOMKilled; raise the memory limit.".to_string(),
        ]));
        let supervisor = Supervisor::new(llm, "system", checkout_registry())
            .with_formatter(Box::new(BrokenFormatter));

        let state = supervisor
            .investigate(InvestigationRequest::new(
                "Why is checkout failing?",
                "alice",
                "sess-fallback",
            ))
            .await
            .unwrap();

        let response = state.final_response.unwrap();
        assert!(!response.is_empty());
        assert!(response.contains("OOMKilled"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let llm = Arc::new(MockLlmClient::new());
        let supervisor = Supervisor::new(llm, "system", checkout_registry());
        let err = supervisor
            .investigate(InvestigationRequest::new("   ", "alice", "sess-empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::EmptyQuery));
    }
}
