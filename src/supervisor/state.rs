//! 调查状态：每次调查独享、显式声明全部字段的记录
//!
//! 每条查询新建一份，由路由器与各工作者依次修改，产出最终回复后即弃；
//! 需要跨调查留存的内容走记忆存储，不留在进程内。字段全部显式声明并
//! 有默认值，入口处校验一次，之后不再有"键可能缺失"的情形。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::memory::{MemoryContext, Message};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::plan::{InvestigationPlan, RouteTarget};
use crate::workers::WorkerKind;

/// 发起一次调查的请求参数
#[derive(Clone, Debug)]
pub struct InvestigationRequest {
    pub query: String,
    pub user_id: String,
    /// 记忆操作的会话标识；记忆启用时必填
    pub session_id: String,
    pub incident_id: Option<String>,
    /// 复杂计划是否跳过人工审批
    pub auto_approve_plan: bool,
}

impl InvestigationRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            incident_id: None,
            auto_approve_plan: false,
        }
    }
}

/// 路由器维护的元数据：活动计划与执行游标
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InvestigationMetadata {
    /// 本次调查唯一的活动计划
    pub plan: Option<InvestigationPlan>,
    /// 工作者序列游标，单调不减
    #[serde(default)]
    pub plan_step: usize,
    /// 复杂计划等待人工审批
    #[serde(default)]
    pub plan_pending_approval: bool,
    #[serde(default)]
    pub routing_reasoning: String,
    /// 计划的 Markdown 呈现（审批消息与最终展示用）
    #[serde(default)]
    pub plan_text: String,
}

/// 调查状态
#[derive(Clone, Debug, Default)]
pub struct InvestigationState {
    /// 运行中的对话（查询、各工作者回复）
    pub messages: Vec<Message>,
    pub current_query: String,
    pub user_id: String,
    pub session_id: String,
    pub incident_id: Option<String>,
    pub auto_approve_plan: bool,
    /// 是否需要多工作者协作（计划含多个工作者时置位）
    pub requires_collaboration: bool,
    /// 工作者 -> 结果文本
    pub agent_results: HashMap<WorkerKind, String>,
    /// 已调用的工作者，按调用顺序
    pub agents_invoked: Vec<WorkerKind>,
    /// 调查开始时取回的记忆上下文，此后原样随行
    pub memory_context: MemoryContext,
    pub metadata: InvestigationMetadata,
    /// 最近一次路由决策的目标
    pub next: Option<RouteTarget>,
    pub final_response: Option<String>,
}

impl InvestigationState {
    /// 由请求构造并校验一次；查询为空直接拒绝
    pub fn from_request(request: InvestigationRequest) -> Result<Self, SupervisorError> {
        if request.query.trim().is_empty() {
            return Err(SupervisorError::EmptyQuery);
        }
        let mut state = Self {
            messages: vec![Message::user(request.query.clone())],
            current_query: request.query,
            user_id: request.user_id,
            session_id: request.session_id,
            incident_id: request.incident_id,
            auto_approve_plan: request.auto_approve_plan,
            ..Self::default()
        };
        state.next = None;
        Ok(state)
    }

    /// 人工批准挂起的计划：清除挂起标记并放行执行
    pub fn approve_plan(&mut self) {
        self.metadata.plan_pending_approval = false;
        self.auto_approve_plan = true;
        self.final_response = None;
        self.next = None;
    }

    /// 记忆操作前的会话前置条件
    pub fn require_session(&self) -> Result<&str, SupervisorError> {
        if self.session_id.trim().is_empty() {
            return Err(SupervisorError::MissingSessionId);
        }
        Ok(&self.session_id)
    }
}
