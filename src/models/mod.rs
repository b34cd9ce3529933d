pub mod event;
pub mod history;
pub mod persona;
pub mod stage;
pub mod submission;

pub use event::{StageError, StageEvent};
pub use history::HistoryRecord;
pub use persona::{load_personas, Persona};
pub use stage::{
    AggregateSummary, KnowledgeTerm, Stage, StageKind, StageResult, StageStatus,
};
pub use submission::Submission;
