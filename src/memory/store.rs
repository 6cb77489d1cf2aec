//! 记忆存储抽象与内存实现
//!
//! `MemoryStore` 是编排器看到的唯一存储接口：save_event / retrieve / list_events / clear。
//! 托管记忆服务（远端）与本地实现都藏在该 trait 之后；内置的 `InMemoryStore`
//! 用关键词重叠做检索打分，并可选 JSON 快照文件以跨进程保留记录（memories 子命令依赖它）。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::records::{MemoryKind, MemoryRecord};

/// 存储层错误（调用方显式匹配，不靠异常拦截）
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory snapshot I/O error: {0}")]
    SnapshotIo(String),

    #[error("Memory snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("Memory backend error: {0}")]
    Backend(String),
}

/// 记忆存储：追加写事件、按查询检索、枚举与清理
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 追加一条事件到 kind/actor 对应的命名空间
    async fn save_event(
        &self,
        kind: MemoryKind,
        actor_id: &str,
        payload: serde_json::Value,
        session_id: &str,
    ) -> Result<(), MemoryError>;

    /// 按查询检索最相关的记录；actor_id 为空串表示跨该类别全部 actor
    async fn retrieve(
        &self,
        kind: MemoryKind,
        actor_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// 枚举某类别（可限定 actor）的全部记录，管理操作用
    async fn list_events(
        &self,
        kind: MemoryKind,
        actor_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// 删除某类别（可限定 actor）的记录，返回删除条数
    async fn clear(&self, kind: MemoryKind, actor_id: Option<&str>) -> Result<usize, MemoryError>;
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '@' && c != '-' && c != '_')
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 快照文件格式：kind 名 -> 记录列表
type SnapshotMap = HashMap<String, Vec<MemoryRecord>>;

/// 内存存储：按类别分桶，检索用查询词与负载 JSON 文本的词重叠打分；
/// 设置快照路径后，每次写入/清理都会重写快照文件
pub struct InMemoryStore {
    records: RwLock<HashMap<MemoryKind, Vec<MemoryRecord>>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// 打开带快照文件的存储；文件存在则加载，不存在则从空开始
    pub fn with_snapshot(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let mut records: HashMap<MemoryKind, Vec<MemoryRecord>> = HashMap::new();

        if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
            let snapshot: SnapshotMap = serde_json::from_str(&data)
                .map_err(|e| MemoryError::SnapshotCorrupt(e.to_string()))?;
            for (kind_name, list) in snapshot {
                if let Some(kind) = MemoryKind::parse(&kind_name) {
                    records.insert(kind, list);
                } else {
                    tracing::warn!("Skipping unknown memory kind in snapshot: {}", kind_name);
                }
            }
        }

        Ok(Self {
            records: RwLock::new(records),
            snapshot_path: Some(path),
        })
    }

    /// 将当前记录重写到快照文件；父目录不存在时自动创建
    fn flush(&self) -> Result<(), MemoryError> {
        let Some(ref path) = self.snapshot_path else {
            return Ok(());
        };
        let snapshot: SnapshotMap = {
            let records = self.records.read().unwrap();
            records
                .iter()
                .map(|(kind, list)| (kind.as_str().to_string(), list.clone()))
                .collect()
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
        Ok(())
    }

    /// 相似度：查询词与记录负载词的交集大小
    fn score(query_tokens: &HashSet<String>, record: &MemoryRecord) -> usize {
        let doc_tokens = tokenize_lower(&record.payload.to_string());
        query_tokens.intersection(&doc_tokens).count()
    }

    /// actor 过滤：空串跨全部 actor，否则精确命名空间
    fn matches_actor(kind: MemoryKind, record: &MemoryRecord, actor_id: &str) -> bool {
        if actor_id.is_empty() {
            kind.actor_from_namespace(&record.namespace).is_some()
        } else {
            record.namespace == kind.namespace(actor_id)
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn save_event(
        &self,
        kind: MemoryKind,
        actor_id: &str,
        payload: serde_json::Value,
        session_id: &str,
    ) -> Result<(), MemoryError> {
        let record = MemoryRecord::new(kind.namespace(actor_id), payload, session_id);
        {
            let mut records = self.records.write().unwrap();
            records.entry(kind).or_default().push(record);
        }
        self.flush()?;
        tracing::debug!("Saved {} event for actor '{}'", kind, actor_id);
        Ok(())
    }

    async fn retrieve(
        &self,
        kind: MemoryKind,
        actor_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read().unwrap();
        let mut scored: Vec<(usize, &MemoryRecord)> = records
            .get(&kind)
            .map(|list| {
                list.iter()
                    .filter(|r| Self::matches_actor(kind, r, actor_id))
                    .map(|r| (Self::score(&query_tokens, r), r))
                    .filter(|(s, _)| *s > 0)
                    .collect()
            })
            .unwrap_or_default();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
        Ok(scored
            .into_iter()
            .take(max_results)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn list_events(
        &self,
        kind: MemoryKind,
        actor_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(&kind)
            .map(|list| {
                list.iter()
                    .filter(|r| Self::matches_actor(kind, r, actor_id.unwrap_or("")))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, kind: MemoryKind, actor_id: Option<&str>) -> Result<usize, MemoryError> {
        let removed = {
            let mut records = self.records.write().unwrap();
            match records.get_mut(&kind) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|r| !Self::matches_actor(kind, r, actor_id.unwrap_or("")));
                    before - list.len()
                }
                None => 0,
            }
        };
        self.flush()?;
        Ok(removed)
    }
}
