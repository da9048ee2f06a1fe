//! The extraction pipeline: fetch -> prompt -> parse -> merge.

pub mod extractor;
pub mod merge;
pub mod parser;
pub mod record;
pub mod schema;
pub mod update;

pub use extractor::{Extractor, QueryReport};
pub use merge::{MergeOutcome, MergePolicy, MergeStrategy, Merger};
pub use record::{ExtractedRecord, ExtractionTarget, FieldValue, TargetKind};
pub use schema::ExtractionSchema;
pub use update::{UpdateReport, UpdateStatus, Updater};
