//! 记忆层：记录模型、存储抽象、调查钩子、知识抽取与对话记录

pub mod conversation;
pub mod extract;
pub mod hooks;
pub mod records;
pub mod store;

pub use conversation::{ConversationManager, Message, Role};
pub use extract::{KnowledgeExtractor, RegexExtractor};
pub use hooks::{MemoryContext, MemoryHookProvider, RetrievalLimits};
pub use records::{
    InfrastructureKnowledge, InvestigationSummary, MemoryKind, MemoryRecord, ResolutionStatus,
    TimelineEntry, UserPreference,
};
pub use store::{InMemoryStore, MemoryError, MemoryStore};
