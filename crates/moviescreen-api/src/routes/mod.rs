//! # Route Modules
//!
//! Each module defines an Axum router for one capability set. Routers are
//! assembled in [`crate::app`].

pub mod health;
pub mod movies;
pub mod users;

use serde::{Deserialize, Serialize};

/// `{"message": ...}` body for acknowledgements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
