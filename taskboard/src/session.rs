//! The authenticated session passed explicitly to every network component.
//!
//! There is no ambient auth state: the REST store and the connection
//! manager each receive a [`Session`] at construction. Dropping the last
//! copy is the logout; the token is wiped from memory when that happens.

use std::fmt;

use zeroize::Zeroizing;

use taskboard_proto::task::MemberId;

/// Credentials and identity of the signed-in user.
#[derive(Clone)]
pub struct Session {
    user_id: MemberId,
    username: String,
    token: Zeroizing<String>,
}

impl Session {
    /// Creates a session from an issued token.
    #[must_use]
    pub fn new(user_id: MemberId, username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            token: Zeroizing::new(token.into()),
        }
    }

    /// The signed-in member.
    #[must_use]
    pub const fn user_id(&self) -> MemberId {
        self.user_id
    }

    /// Display name of the signed-in member.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Value for the `Authorization` header, wiped when dropped.
    #[must_use]
    pub fn bearer(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("Bearer {}", self.token.as_str()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
