//! Per-instance access roles and the acting-user reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access-level tag attached to each model instance in a hook payload.
/// Writes stamp Admin (the actor just performed the write); reads carry the
/// level the mapper computed for the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Guest,
    Public,
    Invalid,
}

/// Reference to the user performing the operation. Anonymous requests carry
/// no id; authentication itself happens upstream of this crate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<Uuid>,
}

impl Actor {
    pub fn new(id: Uuid) -> Self {
        Actor { id: Some(id) }
    }

    pub fn anonymous() -> Self {
        Actor { id: None }
    }
}
