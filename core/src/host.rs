//! Host channel: the chat platform bridge the mini app runs inside
//!
//! The host exposes optional identity data about the launching user and a
//! one-way `send` into the chat. Missing identity is an expected state (the app
//! was opened outside the chat, or from a keyboard button that carries no
//! signed data) and degrades to [`AuthStatus::Unauthenticated`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by the host bridge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Host channel unavailable")]
    Unavailable,
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Close failed: {0}")]
    CloseFailed(String),
}

/// User record the host attaches to the launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUser {
    pub id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

/// Ambient launch data provided by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    /// Raw signed launch string, forwarded verbatim as `init_data`
    pub init_data: String,
    pub user: Option<HostUser>,
}

impl HostIdentity {
    /// Treat an identity with neither signed data nor a user as absent
    pub fn non_empty(self) -> Option<Self> {
        if self.init_data.is_empty() && self.user.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

/// Whether the host vouched for the current user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated(HostUser),
    Unauthenticated,
}

impl AuthStatus {
    pub fn from_identity(identity: Option<&HostIdentity>) -> Self {
        match identity.and_then(|i| i.user.clone()) {
            Some(user) => AuthStatus::Authenticated(user),
            None => AuthStatus::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated(_))
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Authenticated(user) => match (&user.username, &user.first_name) {
                (Some(username), _) => write!(f, "Signed in as @{}", username),
                (None, Some(name)) => write!(f, "Signed in as {}", name),
                (None, None) => write!(f, "Signed in (id {})", user.id),
            },
            AuthStatus::Unauthenticated => {
                write!(f, "Not signed in: open the app from the chat to check in")
            }
        }
    }
}

/// Bridge to the host application
#[cfg_attr(test, mockall::automock)]
pub trait HostChannel {
    /// Ambient identity, if the host provided any
    fn identity(&self) -> Option<HostIdentity>;

    /// Hand a JSON message to the host. Fire-and-forget.
    fn send(&self, message: &str) -> Result<(), ChannelError>;

    /// Ask the host to close the mini app. Best-effort.
    fn close(&self) -> Result<(), ChannelError>;
}

/// The `init_data` string to embed in outbound messages, empty when absent
pub fn init_data_of(host: &dyn HostChannel) -> String {
    host.identity().map(|i| i.init_data).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: Option<&str>, first_name: Option<&str>) -> HostUser {
        HostUser {
            id: 7,
            first_name: first_name.map(str::to_string),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_identity_is_unauthenticated() {
        let status = AuthStatus::from_identity(None);
        assert_eq!(status, AuthStatus::Unauthenticated);
        assert!(!status.is_authenticated());
        assert!(status.to_string().starts_with("Not signed in"));
    }

    #[test]
    fn test_identity_without_user_is_unauthenticated() {
        let identity = HostIdentity {
            init_data: "query_id=1".into(),
            user: None,
        };
        assert_eq!(
            AuthStatus::from_identity(Some(&identity)),
            AuthStatus::Unauthenticated
        );
    }

    #[test]
    fn test_auth_status_display() {
        let by_username = AuthStatus::Authenticated(user(Some("ann"), Some("Ann")));
        assert_eq!(by_username.to_string(), "Signed in as @ann");

        let by_name = AuthStatus::Authenticated(user(None, Some("Ann")));
        assert_eq!(by_name.to_string(), "Signed in as Ann");

        let by_id = AuthStatus::Authenticated(user(None, None));
        assert_eq!(by_id.to_string(), "Signed in (id 7)");
    }

    #[test]
    fn test_non_empty_identity() {
        assert!(HostIdentity::default().non_empty().is_none());
        let identity = HostIdentity {
            init_data: "auth".into(),
            user: None,
        };
        assert!(identity.non_empty().is_some());
    }

    #[test]
    fn test_init_data_of_falls_back_to_empty() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        assert_eq!(init_data_of(&host), "");

        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| {
            Some(HostIdentity {
                init_data: "user=%7B%7D&hash=abc".into(),
                user: None,
            })
        });
        assert_eq!(init_data_of(&host), "user=%7B%7D&hash=abc");
    }
}
