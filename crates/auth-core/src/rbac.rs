//! 角色与权限表

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 账户角色
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    TopAdmin,
    FinanceManager,
    /// 新注册账户的角色
    #[default]
    Marketer,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::TopAdmin,
        Role::FinanceManager,
        Role::Marketer,
        Role::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::TopAdmin => "top_admin",
            Role::FinanceManager => "finance_manager",
            Role::Marketer => "marketer",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RbacError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl FromStr for Role {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_admin" => Ok(Role::TopAdmin),
            "finance_manager" => Ok(Role::FinanceManager),
            "marketer" => Ok(Role::Marketer),
            "customer" => Ok(Role::Customer),
            other => Err(RbacError::UnknownRole(other.to_string())),
        }
    }
}

/// 角色 → 权限列表
///
/// 每个角色的权限保持声明顺序且去重
#[derive(Debug, Clone)]
pub struct RolePermissionTable {
    entries: HashMap<Role, Vec<String>>,
}

impl RolePermissionTable {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Role, Vec<P>)>,
        P: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(role, perms)| (role, dedup(perms.into_iter().map(Into::into))))
            .collect();
        Self { entries }
    }

    /// 内置权限表
    pub fn builtin() -> Self {
        Self::new([
            (
                Role::TopAdmin,
                vec![
                    "customers:read",
                    "customers:write",
                    "visits:read",
                    "visits:write",
                    "invoices:read",
                    "invoices:write",
                    "marketers:read",
                    "marketers:write",
                    "accounts:manage",
                    "reports:read",
                ],
            ),
            (
                Role::FinanceManager,
                vec![
                    "customers:read",
                    "invoices:read",
                    "invoices:write",
                    "reports:read",
                ],
            ),
            (
                Role::Marketer,
                vec![
                    "customers:read",
                    "customers:write",
                    "visits:read",
                    "visits:write",
                    "invoices:read",
                ],
            ),
            (Role::Customer, vec!["profile:read"]),
        ])
    }

    /// 用配置覆盖指定角色的权限；未出现的角色保持内置值
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<String, Vec<String>>,
    ) -> Result<Self, RbacError> {
        for (name, perms) in overrides {
            let role: Role = name.parse()?;
            self.entries.insert(role, dedup(perms.iter().cloned()));
        }
        Ok(self)
    }

    pub fn permissions(&self, role: Role) -> &[String] {
        self.entries.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_permission(&self, role: Role, permission: &str) -> bool {
        self.permissions(role).iter().any(|p| p == permission)
    }

    /// 按 `Role::ALL` 顺序列出
    pub fn roles(&self) -> impl Iterator<Item = (Role, &[String])> + '_ {
        Role::ALL
            .into_iter()
            .map(move |role| (role, self.permissions(role)))
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn dedup(perms: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in perms {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!(matches!("admin".parse::<Role>(), Err(RbacError::UnknownRole(_))));
    }

    #[test]
    fn test_role_serde_is_snake_case() {
        let json = serde_json::to_string(&Role::FinanceManager).unwrap();
        assert_eq!(json, "\"finance_manager\"");
        let role: Role = serde_json::from_str("\"top_admin\"").unwrap();
        assert_eq!(role, Role::TopAdmin);
    }

    #[test]
    fn test_default_role_is_marketer() {
        assert_eq!(Role::default(), Role::Marketer);
    }

    #[test]
    fn test_builtin_table() {
        let table = RolePermissionTable::builtin();
        assert!(table.has_permission(Role::TopAdmin, "accounts:manage"));
        assert!(table.has_permission(Role::FinanceManager, "invoices:write"));
        assert!(!table.has_permission(Role::FinanceManager, "visits:write"));
        assert!(table.has_permission(Role::Marketer, "visits:write"));
        assert!(!table.has_permission(Role::Marketer, "accounts:manage"));
        assert_eq!(table.permissions(Role::Customer), ["profile:read".to_string()]);
    }

    #[test]
    fn test_overrides_replace_only_named_roles() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "customer".to_string(),
            vec!["profile:read".to_string(), "invoices:read".to_string(), "profile:read".to_string()],
        );

        let table = RolePermissionTable::builtin().with_overrides(&overrides).unwrap();
        assert_eq!(table.permissions(Role::Customer).len(), 2);
        assert!(table.has_permission(Role::Customer, "invoices:read"));
        assert!(table.has_permission(Role::TopAdmin, "accounts:manage"));
    }

    #[test]
    fn test_override_with_unknown_role_fails() {
        let mut overrides = HashMap::new();
        overrides.insert("superuser".to_string(), vec!["*".to_string()]);
        assert!(RolePermissionTable::builtin().with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_roles_listed_in_fixed_order() {
        let table = RolePermissionTable::builtin();
        let roles: Vec<Role> = table.roles().map(|(r, _)| r).collect();
        assert_eq!(roles, Role::ALL.to_vec());
    }
}
