//! 调查编排：计划、路由、执行、聚合
//!
//! 模块按职责拆分：planner 构建结构化计划，router 驱动状态机，
//! loop_ 串起工作者调用，aggregator 产出最终答复。

pub mod aggregator;
pub mod error;
pub mod loop_;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod router;
pub mod state;

pub use aggregator::{FormatError, MarkdownFormatter, ResponseAggregator, ResponseFormatter};
pub use error::SupervisorError;
pub use loop_::{MemoryHandles, Supervisor};
pub use plan::{Complexity, InvestigationPlan, RouteDecision, RouteTarget};
pub use planner::{PlanBuilder, SUPERVISOR_DISPLAY_NAME};
pub use prompts::{load_supervisor_prompt, DEFAULT_SUPERVISOR_PROMPT};
pub use router::Router;
pub use state::{InvestigationMetadata, InvestigationRequest, InvestigationState};
