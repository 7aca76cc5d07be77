use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "client" => Some(Role::Client),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
}

impl AccountStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "banned" => Some(AccountStatus::Banned),
            _ => None,
        }
    }
}

/// The authenticated caller, as vouched for by the identity gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub account_status: AccountStatus,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            account_status: AccountStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.account_status == AccountStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateBooking,
    ViewBooking,
    ViewAllBookings,
    UpdateBooking,
    CancelBooking,
    ConfirmBooking,
    CompleteBooking,
    RegisterPayment,
}

/// Capability table. Ownership scoping is applied separately by the caller.
pub fn allows(role: Role, action: Action) -> bool {
    use Action::*;
    match role {
        Role::Admin => true,
        Role::Manager => !matches!(action, ViewAllBookings),
        Role::Client => matches!(
            action,
            CreateBooking | ViewBooking | UpdateBooking | CancelBooking | RegisterPayment
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_capabilities() {
        assert!(allows(Role::Client, Action::CreateBooking));
        assert!(allows(Role::Client, Action::CancelBooking));
        assert!(!allows(Role::Client, Action::ConfirmBooking));
        assert!(!allows(Role::Client, Action::CompleteBooking));
        assert!(!allows(Role::Client, Action::ViewAllBookings));
    }

    #[test]
    fn test_manager_capabilities() {
        assert!(allows(Role::Manager, Action::ConfirmBooking));
        assert!(allows(Role::Manager, Action::CompleteBooking));
        assert!(!allows(Role::Manager, Action::ViewAllBookings));
    }

    #[test]
    fn test_admin_allows_everything() {
        for action in [
            Action::CreateBooking,
            Action::ViewBooking,
            Action::ViewAllBookings,
            Action::UpdateBooking,
            Action::CancelBooking,
            Action::ConfirmBooking,
            Action::CompleteBooking,
            Action::RegisterPayment,
        ] {
            assert!(allows(Role::Admin, action));
        }
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Manager"), Some(Role::Manager));
        assert_eq!(Role::parse("owner"), None);
    }
}
