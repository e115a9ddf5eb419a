//! # Permission Gates
//!
//! Per-route authorization. A [`PermissionGate`] names one required code;
//! [`require_permission`] looks up the caller's codes and rejects with 403
//! if the code is missing. Read and write routes each carry their own gate
//! over the same lookup.
//!
//! Gates are installed with `route_layer` after the activation gate, so an
//! anonymous or unactivated caller is turned away before any lookup.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use moviescreen_core::{Identity, Permissions};

use crate::auth::CurrentIdentity;
use crate::error::AppError;
use crate::store::PermissionSource;

/// A required permission code plus the source to check it against.
#[derive(Clone)]
pub struct PermissionGate {
    pub code: &'static str,
    pub source: Arc<dyn PermissionSource>,
}

impl PermissionGate {
    pub fn new(code: &'static str, source: Arc<dyn PermissionSource>) -> Self {
        Self { code, source }
    }

    /// Codes held by `identity`; anonymous callers hold none.
    async fn codes_for(&self, identity: &Identity) -> Result<Permissions, AppError> {
        let Some(owner) = identity.owner_id() else {
            return Ok(Permissions::new());
        };
        self.source
            .all_codes_for_owner(owner)
            .await
            .map_err(|e| AppError::Internal(format!("loading permissions for user {owner}: {e}")))
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    CurrentIdentity(identity): CurrentIdentity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let codes = gate.codes_for(&identity).await?;
    if !codes.includes(gate.code) {
        tracing::debug!(owner = ?identity.owner_id(), code = gate.code, "permission denied");
        return Err(AppError::NotPermitted);
    }
    Ok(next.run(request).await)
}
