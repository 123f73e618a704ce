pub mod checker;
pub mod config;
pub mod error;
pub mod evidence;
pub mod llm;
pub mod report;
pub mod reviser;
pub mod segments;
pub mod serper;
pub mod server;
pub mod types;
pub mod verification;

pub use checker::{CheckRequest, ClaimChecker, LlmChecker};
pub use config::{LoopConfig, Settings, VerificationLevel};
pub use error::{CollaboratorError, ConfigError};
pub use reviser::{LlmReviser, Reviser};
pub use types::*;
pub use verification::{verify_content, LoopResult, VerificationLoop};
