//! 账户实体

use crm_auth_core::Role;
use crm_common::{AccountId, AuditInfo};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::PhoneNumber;

/// 账户
///
/// 手机号首次验证成功时创建，之后只会被停用，不会被删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub phone: PhoneNumber,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub audit_info: AuditInfo,
}

impl Account {
    /// 新注册账户：默认角色、启用状态
    pub fn register(phone: PhoneNumber) -> Self {
        Self {
            id: AccountId::new(),
            phone,
            display_name: None,
            role: Role::default(),
            is_active: true,
            audit_info: AuditInfo::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn set_active(&mut self, active: bool) {
        if self.is_active != active {
            self.is_active = active;
            self.audit_info.touch();
        }
    }
}
