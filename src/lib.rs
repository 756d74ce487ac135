//! Sketch analysis library: links archive scenes to channel videos and
//! tests whether engagement differs across scene types, performers and
//! duration ranges.

pub mod anova;
pub mod attribute;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod fuzzy;
pub mod grouping;
pub mod linker;
pub mod models;
pub mod normality;
pub mod normalize;
pub mod posthoc;
pub mod progress;
pub mod report;
pub mod safety;
pub mod session;
pub mod snapshot;
pub mod tester;

pub use attribute::Attribute;
pub use config::PipelineConfig;
pub use errors::{AnalysisError, Result};
pub use fuzzy::{best_match, FuzzyMatcher};
pub use grouping::{Dimension, GroupIndexer, Groups};
pub use linker::{LinkResult, RecordLinker};
pub use models::{ArchiveScene, FullDataSnapshot, PlatformVideo, Sketch};
pub use normality::keep_normal;
pub use report::AttributeReport;
pub use session::AnalysisSession;
pub use tester::{GroupStatTester, TestOutcome, TestReport};
