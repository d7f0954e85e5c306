//! 领域服务

mod authorization_gate;
mod bypass_policy;
mod code_hasher;
mod credential_verifier;
mod otp_challenge_service;
mod token_issuer;

pub use authorization_gate::*;
pub use bypass_policy::*;
pub use code_hasher::*;
pub use credential_verifier::*;
pub use otp_challenge_service::*;
pub use token_issuer::*;
