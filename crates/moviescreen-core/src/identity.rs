//! Request-scoped caller identity.
//!
//! The authenticator attaches exactly one [`Identity`] to every request that
//! passes it. Handlers and gates read it through a typed extractor; there are
//! no string-keyed lookups.

use serde::Serialize;

use crate::user::UserId;

/// The account behind an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: UserId,
    pub activated: bool,
}

/// Who is making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    /// No `Authorization` header was presented.
    #[default]
    Anonymous,
    /// A valid authentication token resolved to this account.
    Account(Account),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Anonymous => None,
            Self::Account(account) => Some(account),
        }
    }

    /// Owner id for permission lookups; `None` for anonymous callers.
    pub fn owner_id(&self) -> Option<UserId> {
        self.account().map(|a| a.id)
    }

    /// Anonymous callers are never activated.
    pub fn is_activated(&self) -> bool {
        self.account().is_some_and(|a| a.activated)
    }
}
