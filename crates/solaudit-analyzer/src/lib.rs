pub mod runner;
pub mod scratch;

pub use runner::{ProcessOutcome, StaticAnalysisRunner};
pub use scratch::{ScratchFile, ScratchFileManager};
