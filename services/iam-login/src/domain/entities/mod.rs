//! 领域实体

mod account;
mod otp_challenge;

pub use account::*;
pub use otp_challenge::*;
