pub mod event;

pub use event::{
    EventType, ItemAnalyzedPayload, JobCompletedPayload, JobStartedPayload, ResumeFrame,
    UpstreamEvent,
};
