//! 验证码值对象

use std::fmt;

use rand::Rng;
use rand::rngs::OsRng;

use super::phone_number::fold_digits;

/// 验证码位数
pub const CODE_LENGTH: usize = 4;

/// 明文验证码，仅在签发和校验的瞬间存在于内存中
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    /// 生成随机验证码（系统熵源）
    pub fn generate() -> Self {
        let n: u32 = OsRng.gen_range(0..10u32.pow(CODE_LENGTH as u32));
        Self(format!("{:0width$}", n, width = CODE_LENGTH))
    }

    pub fn fixed(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// 用户提交的验证码：去除空白并统一数字
    ///
    /// 不校验格式，格式错误的验证码只会校验失败
    pub fn from_submitted(input: &str) -> Self {
        Self(fold_digits(input.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(****)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_four_ascii_digits() {
        for _ in 0..200 {
            let code = OtpCode::generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_submitted_code_is_normalized() {
        assert_eq!(OtpCode::from_submitted(" ۱۲۳۴ ").as_str(), "1234");
    }

    #[test]
    fn test_debug_does_not_leak() {
        assert_eq!(format!("{:?}", OtpCode::fixed("1234")), "OtpCode(****)");
    }
}
