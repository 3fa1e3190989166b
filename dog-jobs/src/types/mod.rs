pub mod ids;
pub mod options;
pub mod record;
pub mod priority;
pub mod events;

pub use ids::JobId;
pub use options::EnqueueOptions;
pub use record::{JobRecord, JobState};
pub use priority::JobPriority;
pub use events::JobEvent;
