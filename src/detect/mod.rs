pub mod aggregator;
pub mod fallback;
pub mod link;
mod result;

pub use aggregator::{DetectionAggregator, DetectionEvent, EventFilter, EventSummary, MAX_EVENTS};
pub use fallback::FallbackGenerator;
pub use link::InferenceLink;
pub use result::{DetectionBox, InferenceMessage, RawDetection, DEFAULT_LABEL};
