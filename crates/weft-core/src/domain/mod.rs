//! Domain model (ids, priority, status, specs, results, records, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod priority;
pub mod record;
pub mod result;
pub mod status;
pub mod task;

pub use errors::{ManagerError, TaskError};
pub use events::TaskEvent;
pub use ids::TaskId;
pub use priority::Priority;
pub use record::TaskRecord;
pub use result::TaskResult;
pub use status::TaskStatus;
pub use task::{
    CancelCallback, ProgressCallback, TaskOptions, TaskProgress, TaskSpec, TaskValue, Work,
};
