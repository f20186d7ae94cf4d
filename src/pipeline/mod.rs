/*!
 * Chapter job execution: orchestration, retries and per-story lanes.
 */

pub mod lanes;
pub mod orchestrator;
pub mod retry;
pub mod steps;

pub use lanes::StoryLanes;
pub use orchestrator::{BatchAck, BatchReport, JobOrchestrator, OrchestratorSettings, DEFAULT_MODEL};
pub use retry::{Retried, RetryPolicy};
pub use steps::{ChapterOutcome, RunResult, StepName, StepOutcome, StepRecord};
