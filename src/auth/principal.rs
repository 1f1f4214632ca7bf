//! Request identity.

use serde::{Deserialize, Serialize};

/// Numeric identity of a user. `0` is reserved for the anonymous principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub const ANONYMOUS: UserId = UserId(0);
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The identity attached to a request.
///
/// Either the anonymous sentinel or the owner of a verified credential.
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: UserId,
    activated: bool,
}

impl Principal {
    /// The well-known principal of requests without an `Authorization` header.
    pub const ANONYMOUS: Principal = Principal {
        id: UserId::ANONYMOUS,
        activated: false,
    };

    /// A principal for a stored user. Real users never carry the anonymous id.
    pub fn user(id: UserId, activated: bool) -> Option<Self> {
        (id != UserId::ANONYMOUS).then_some(Self { id, activated })
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == UserId::ANONYMOUS
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_sentinel() {
        assert!(Principal::ANONYMOUS.is_anonymous());
        assert!(!Principal::ANONYMOUS.is_activated());
        assert!(Principal::user(UserId::ANONYMOUS, true).is_none());
    }

    #[test]
    fn test_real_user_is_never_anonymous() {
        let principal = Principal::user(UserId(7), true).unwrap();
        assert!(!principal.is_anonymous());
        assert!(principal.is_activated());
        assert_ne!(principal, Principal::ANONYMOUS);
    }
}
