//! Identity and permission providers.
//!
//! Recording requires a signed-in user and microphone access. Both are owned
//! by the host application; the controller only asks.

use crate::alert::UserId;

/// Instructions shown when microphone permission is missing.
pub const MICROPHONE_INSTRUCTIONS: &str =
    "Grant microphone access to the recorder (capture.microphone_permission) and try again.";

/// Source of the currently authenticated user.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when signed out.
    async fn current_user(&self) -> Option<UserId>;
}

/// Source of capture permission decisions.
#[async_trait::async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Ask for microphone access. Returns whether it was granted.
    async fn request_microphone_permission(&self) -> bool;
}

/// Identity fixed at construction (from configuration or tests).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    /// An identity provider that always reports `user`.
    #[must_use]
    pub fn signed_in(user: impl Into<String>) -> Self {
        Self {
            user: Some(UserId::new(user)),
        }
    }

    /// An identity provider with nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None }
    }

    /// Build from an optional configured user id; blank ids count as signed out.
    #[must_use]
    pub fn from_config(user_id: Option<&str>) -> Self {
        match user_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::signed_in(id),
            _ => Self::signed_out(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

/// Permission decision fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission {
    granted: bool,
}

impl StaticPermission {
    /// A provider that answers every request with `granted`.
    #[must_use]
    pub const fn new(granted: bool) -> Self {
        Self { granted }
    }
}

#[async_trait::async_trait]
impl PermissionProvider for StaticPermission {
    async fn request_microphone_permission(&self) -> bool {
        self.granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_identity() {
        assert_eq!(
            StaticIdentity::signed_in("u1").current_user().await,
            Some(UserId::new("u1"))
        );
        assert_eq!(StaticIdentity::signed_out().current_user().await, None);
    }

    #[tokio::test]
    async fn test_identity_from_config() {
        assert_eq!(
            StaticIdentity::from_config(Some(" u7 ")).current_user().await,
            Some(UserId::new("u7"))
        );
        assert_eq!(StaticIdentity::from_config(Some("  ")).current_user().await, None);
        assert_eq!(StaticIdentity::from_config(None).current_user().await, None);
    }

    #[tokio::test]
    async fn test_static_permission() {
        assert!(StaticPermission::new(true).request_microphone_permission().await);
        assert!(!StaticPermission::new(false).request_microphone_permission().await);
    }

    #[test]
    fn test_instructions_mention_microphone() {
        assert!(MICROPHONE_INSTRUCTIONS.contains("microphone"));
    }
}
