//! 值对象

mod otp_code;
mod phone_number;

pub use otp_code::*;
pub use phone_number::*;
