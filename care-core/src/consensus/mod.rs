//! Consensus across independent text-generation providers

pub mod agreement;
pub mod validator;

pub use agreement::{jaccard, keywords, AgreementReport};
pub use validator::{
    Alternate, ConsensusError, ConsensusResult, ConsensusValidator, ProviderFailure,
    ValidationResult,
};
