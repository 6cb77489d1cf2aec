//! 对话消息与对话记忆管理
//!
//! `Message`/`Role` 供 LLM 上下文使用；`ConversationManager` 将调查过程中的
//! 用户查询与智能体回复成批写入存储的 conversations 命名空间。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::records::MemoryKind;
use crate::memory::store::{MemoryError, MemoryStore};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话记忆管理器：按用户命名空间成批写入消息
pub struct ConversationManager {
    store: Arc<dyn MemoryStore>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// 成批保存消息对：(内容, 角色)；单条失败即返回错误，由调用方决定是否降级
    pub async fn store_batch(
        &self,
        messages: &[(String, Role)],
        user_id: &str,
        session_id: &str,
        agent_name: &str,
    ) -> Result<(), MemoryError> {
        for (content, role) in messages {
            let payload = serde_json::json!({
                "role": match role {
                    Role::User => "USER",
                    Role::Assistant => "ASSISTANT",
                    Role::System => "SYSTEM",
                },
                "content": content,
                "agent_name": agent_name,
            });
            self.store
                .save_event(MemoryKind::Conversations, user_id, payload, session_id)
                .await?;
        }
        tracing::debug!(
            "Stored {} conversation messages for user '{}' (session {})",
            messages.len(),
            user_id,
            session_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemoryStore;

    #[tokio::test]
    async fn test_store_batch() {
        let store = Arc::new(InMemoryStore::new());
        let manager = ConversationManager::new(store.clone());

        manager
            .store_batch(
                &[
                    ("why is checkout failing".to_string(), Role::User),
                    ("Investigation Plan: ...".to_string(), Role::Assistant),
                ],
                "alice",
                "sess-1",
                "Supervisor Agent",
            )
            .await
            .unwrap();

        let events = store
            .list_events(MemoryKind::Conversations, Some("alice"))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["role"], "USER");
        assert_eq!(events[1].payload["agent_name"], "Supervisor Agent");
    }
}
