pub mod chunker;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod grounding;
pub mod parser;
pub mod prompt;
pub mod proposer;
pub mod retry;
pub mod sanitize;
pub mod types;
pub mod verifier;

pub use chunker::{split_into_windows, TextChunk};
pub use consensus::{build_report, check_alignment, merge, merge_windows};
pub use engine::{engine_status, ConsensusEngine, SYSTEM_NAME};
pub use error::ConsensusError;
pub use proposer::Proposer;
pub use retry::RetryPolicy;
pub use types::{
    CandidateParameter, Category, ConsensusReport, EngineStatus, ExtractionResponse, ModelStatus,
    ReportItem, ResponseItem, VerificationVerdict, VERIFICATION_PARSE_FAILURE,
};
pub use verifier::Verifier;
