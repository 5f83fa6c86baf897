pub mod analysis;
pub mod bad_chars;
pub mod batch;
pub mod config;
pub mod corpus;
pub mod executor;
pub mod observer;
pub mod oracle;
pub mod orchestrator;
pub mod report;
pub mod stats;
pub mod verify;

pub use analysis::{BadRun, ByteAnalysis, analyze};
pub use bad_chars::BadCharSet;
pub use batch::{BatchOptions, BatchStatus, BatchSummary, batch_verify};
pub use config::{HarnessConfig, ModeConfig};
pub use corpus::{CorpusFile, DiscoveryError, discover};
pub use executor::{Executor, ExecutorError, ProcessOutcome, TransformerConfig, TransformerExecutor};
pub use observer::{TransformerStats, observe};
pub use oracle::{RunStatus, classify};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use report::{AssessmentReport, ReportError, ReportMetadata};
pub use stats::{CorpusStatistics, FileRecord, ModeComparison, ModeRun, ModeStats};
pub use verify::{VerificationVerdict, VerifyError, verify, verify_files};
