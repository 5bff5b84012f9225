use tokio::sync::Mutex;

use crate::api::BackendClient;
use crate::cancel::CancelToken;
use crate::error::ApiError;
use crate::models::User;

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Unresolved,
    Resolved(Option<User>),
}

/// Process-wide view of who is signed in.
///
/// Resolved from `/user/details` the first time someone asks, then served from
/// memory until `invalidate` runs (logout, or any 401 seen by the client).
#[derive(Debug, Default)]
pub struct SessionContext {
    state: Mutex<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(
        &self,
        client: &BackendClient,
        cancel: &CancelToken,
    ) -> Result<Option<User>, ApiError> {
        let mut state = self.state.lock().await;
        if let SessionState::Resolved(user) = &*state {
            return Ok(user.clone());
        }

        let user = match client.user_details(cancel).await {
            Ok(details) => details.and_then(|details| details.into_user()),
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
            Err(err) => {
                tracing::warn!("could not check sign-in status: {}", err);
                None
            }
        };

        match &user {
            Some(user) => {
                tracing::debug!(email = %user.email, role = user.role.as_str(), "session resolved")
            }
            None => tracing::debug!("no active session"),
        }
        *state = SessionState::Resolved(user.clone());
        Ok(user)
    }

    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, SessionState::Resolved(_)) {
            tracing::debug!("session invalidated");
        }
        *state = SessionState::Unresolved;
    }

    pub async fn is_resolved(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Resolved(_))
    }
}
