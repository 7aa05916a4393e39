//! Task planning and command dispatch.

pub mod executor;
pub mod task;

pub use executor::{
    dispatch_commands, wait_for_executor, DispatchReport, ExecutorError, LoggingExecutor,
    PickPlaceExecutor,
};
pub use task::{
    plan_pick_place, Arm, DropBoxEntry, PickListEntry, PickPlaceCommand, PlanOutcome,
    PlanningConfig, PlanningIssue, Point, Pose, Quaternion,
};
