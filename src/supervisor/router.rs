//! 路由器：调查状态机
//!
//! 状态：NO_PLAN -> (PLAN_PENDING_APPROVAL | EXECUTING(i)) -> FINISH。
//! 首次调用构建计划；复杂且未放行的计划挂起待审批（本轮终止）；
//! 其余按计划的工作者序列推进游标，游标到头即 FINISH。
//! 游标单调不减，终态幂等：游标越界时反复调用始终返回 FINISH。

use crate::memory::{ConversationManager, MemoryHookProvider};
use crate::supervisor::error::SupervisorError;
use crate::supervisor::plan::{Complexity, RouteDecision, RouteTarget};
use crate::supervisor::planner::PlanBuilder;
use crate::supervisor::state::InvestigationState;

/// 路由器：持有计划构建器，route 逐轮决定下一目标
pub struct Router {
    plan_builder: PlanBuilder,
}

impl Router {
    pub fn new(plan_builder: PlanBuilder) -> Self {
        Self { plan_builder }
    }

    /// 决定下一个工作者或终止；元数据（计划、游标、挂起标记）就地更新
    pub async fn route(
        &self,
        state: &mut InvestigationState,
        hooks: Option<&MemoryHookProvider>,
        conversation: Option<&ConversationManager>,
    ) -> Result<RouteDecision, SupervisorError> {
        // 挂起待审批：在被放行之前始终终止本轮
        if state.metadata.plan_pending_approval {
            return Ok(RouteDecision {
                next: RouteTarget::Finish,
                reasoning: "Plan awaiting user approval".to_string(),
            });
        }

        if state.metadata.plan.is_none() {
            return self.route_new_plan(state, hooks, conversation).await;
        }
        Ok(Self::route_existing_plan(state))
    }

    /// NO_PLAN：构建计划，决定挂起或进入执行
    async fn route_new_plan(
        &self,
        state: &mut InvestigationState,
        hooks: Option<&MemoryHookProvider>,
        conversation: Option<&ConversationManager>,
    ) -> Result<RouteDecision, SupervisorError> {
        let plan = self.plan_builder.build(state, hooks, conversation).await?;
        let plan_text = plan.to_markdown();
        state.requires_collaboration = plan.agents_sequence.len() > 1;

        // simple 计划与放行的计划直接执行；仅 complex 且未放行时挂起
        let pending = plan.complexity == Complexity::Complex
            && !plan.auto_execute
            && !state.auto_approve_plan;

        if pending {
            state.metadata.routing_reasoning =
                "Created investigation plan. Complexity: complex".to_string();
            state.metadata.plan_pending_approval = true;
            state.metadata.plan_text = plan_text;
            state.metadata.plan = Some(plan);
            state.metadata.plan_step = 0;
            return Ok(RouteDecision {
                next: RouteTarget::Finish,
                reasoning: "Complex plan requires user approval before execution".to_string(),
            });
        }

        // normalized() 保证序列非空
        let first = plan.agents_sequence[0];
        let reasoning = format!(
            "Executing plan step 1: {}",
            plan.steps.first().map(String::as_str).unwrap_or("Start")
        );
        state.metadata.routing_reasoning = reasoning.clone();
        state.metadata.plan_text = plan_text;
        state.metadata.plan = Some(plan);
        state.metadata.plan_step = 0;

        Ok(RouteDecision {
            next: RouteTarget::Worker(first),
            reasoning,
        })
    }

    /// EXECUTING(i)：推进游标或终止
    fn route_existing_plan(state: &mut InvestigationState) -> RouteDecision {
        // route() 已确认计划存在
        let plan = state.metadata.plan.clone().unwrap();
        let current = state.metadata.plan_step;

        // 尚未调用任何工作者（如刚获批）时停在当前游标，否则前进一格
        let next_step = if current >= plan.agents_sequence.len() || state.agents_invoked.is_empty()
        {
            current
        } else {
            current + 1
        };

        if next_step >= plan.agents_sequence.len() {
            state.metadata.plan_step = next_step;
            state.metadata.routing_reasoning =
                "Investigation plan completed. Presenting results.".to_string();
            return RouteDecision {
                next: RouteTarget::Finish,
                reasoning: state.metadata.routing_reasoning.clone(),
            };
        }

        let worker = plan.agents_sequence[next_step];
        let step_description = plan
            .steps
            .get(next_step)
            .cloned()
            .unwrap_or_else(|| format!("Execute {}", worker));
        let reasoning = format!("Executing plan step {}: {}", next_step + 1, step_description);
        state.metadata.plan_step = next_step;
        state.metadata.routing_reasoning = reasoning.clone();

        RouteDecision {
            next: RouteTarget::Worker(worker),
            reasoning,
        }
    }
}
