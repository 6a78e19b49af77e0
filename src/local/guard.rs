//! Decides where a returning user lands, using only what is on the device.

use chrono::{DateTime, Utc};

use super::models::LocalContext;
use super::{LocalStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    RedirectLogin,
    RedirectSelectProyecto,
    Allow(LocalContext),
}

/// Evaluate the stored session and context at `now`.
///
/// An expired session is removed before redirecting to login. A session whose
/// expiry cannot be read also redirects to login but is left in place.
pub async fn check_access(
    store: &LocalStore,
    now: DateTime<Utc>,
) -> Result<GuardOutcome, StoreError> {
    store.initialize().await?;

    let Some(session) = store.get_session().await? else {
        return Ok(GuardOutcome::RedirectLogin);
    };

    if session.is_expired(now) {
        tracing::info!(id_usuario = %session.id_usuario, "session expired");
        store.clear_session().await?;
        return Ok(GuardOutcome::RedirectLogin);
    }
    if !session.is_valid(now) {
        tracing::warn!(id_usuario = %session.id_usuario, "session expiry unreadable");
        return Ok(GuardOutcome::RedirectLogin);
    }

    match store.get_context(&session.id_usuario).await? {
        Some(context) => Ok(GuardOutcome::Allow(context)),
        None => Ok(GuardOutcome::RedirectSelectProyecto),
    }
}
