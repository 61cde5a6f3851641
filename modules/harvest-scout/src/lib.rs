pub mod adapters;
pub mod cli;
pub mod dates;
pub mod merge;
pub mod normalizer;
pub mod orchestrator;
pub mod resolve;
pub mod sink;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapters::{AdapterContext, CursorPosition, PageCursor, Platform, SourceAdapter};
pub use dates::{parse_review_date, DateRangeFilter, DateVerdict};
pub use merge::{merge, MergedDuplicate};
pub use normalizer::{NormalizationError, ReviewNormalizer};
pub use orchestrator::PipelineOrchestrator;
pub use sink::{write_report, write_reviews};
