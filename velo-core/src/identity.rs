use serde::{Deserialize, Serialize};
use uuid::Uuid;
use velo_shared::Masked;

use crate::model::Ride;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Assistant,
    Manager,
    Admin,
}

impl Role {
    /// Staff roles allowed to act on rides they do not own.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Assistant)
    }
}

/// The authenticated identity of a request, as supplied by the identity provider.
///
/// Trusted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: Uuid, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            name: name.into(),
            email: Masked(email.into()),
            role,
        }
    }

    pub fn owns(&self, ride: &Ride) -> bool {
        ride.owner_id == self.user_id
    }

    /// Ride owners and staff may force completion.
    pub fn can_manage(&self, ride: &Ride) -> bool {
        self.owns(ride) || self.role.is_elevated()
    }
}
