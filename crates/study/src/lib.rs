mod plan;
mod session;

pub use plan::{PlanError, SequenceSlot, StudyPlan, STUDY_LENGTH};
pub use session::{
    SessionFactory, StudyError, StudySession, StudyState, DEFAULT_RECORD_TIMEOUT,
    DEFAULT_REPLY_TIMEOUT,
};
