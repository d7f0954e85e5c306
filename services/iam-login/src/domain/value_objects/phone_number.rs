//! 手机号值对象
//!
//! 规范格式：`09XXXXXXXXX`（11 位本地格式）

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("Phone number is empty")]
    Empty,

    #[error("Phone number is not a valid mobile number")]
    Invalid,
}

/// 已规范化的手机号
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// 解析并规范化
    ///
    /// 接受 `09XXXXXXXXX`、`+989XXXXXXXXX`、`00989XXXXXXXXX`、`989XXXXXXXXX`、`9XXXXXXXXX`，
    /// 忽略空格、横线和括号，波斯数字/阿拉伯-印度数字视同 ASCII 数字
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let folded = fold_digits(input);
        let compact: String = folded
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '\u{200c}') && !c.is_whitespace())
            .collect();

        if compact.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (has_plus, digits) = match compact.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, compact.as_str()),
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoneError::Invalid);
        }

        let subscriber = match (has_plus, digits.len()) {
            (true, 12) => digits.strip_prefix("98"),
            (false, 14) => digits.strip_prefix("0098"),
            (false, 12) => digits.strip_prefix("98"),
            (false, 11) => digits.strip_prefix('0'),
            (false, 10) => Some(digits),
            _ => None,
        }
        .ok_or(PhoneError::Invalid)?;

        if subscriber.len() != 10 || !subscriber.starts_with('9') {
            return Err(PhoneError::Invalid);
        }

        Ok(Self(format!("0{}", subscriber)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志用掩码形式：`0912***0001`
    pub fn masked(&self) -> String {
        format!("{}***{}", &self.0[..4], &self.0[7..])
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// 将波斯数字（U+06F0..U+06F9）和阿拉伯-印度数字（U+0660..U+0669）转为 ASCII
pub fn fold_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}
