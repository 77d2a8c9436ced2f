//! Principal kinds and the session key scheme.
//!
//! The four kinds form a closed enum: every dispatch site matches
//! exhaustively, so adding a kind is a compile-guided change instead of a
//! hunt for stringly-typed call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Any authenticated actor in the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
    Manager,
    Device,
}

impl PrincipalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Device => "device",
        }
    }

    /// Humans authenticate with a password; devices with the puzzle.
    #[must_use]
    pub fn is_human(self) -> bool {
        !matches!(self, Self::Device)
    }

    /// Session store key for this principal: `session:{kind}:{id}`.
    #[must_use]
    pub fn session_key(self, id: i64) -> String {
        format!("session:{}:{id}", self.as_str())
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
