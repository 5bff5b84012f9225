use crate::api::BackendClient;
use crate::cancel::CancelToken;
use crate::error::ApiError;
use crate::models::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Registration,
    CheckIn,
    CheckOut,
    StudentCheck,
    Emoji,
    Confirmation,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/",
            Route::Registration => "/cadastro",
            Route::CheckIn => "/checkin",
            Route::CheckOut => "/checkout",
            Route::StudentCheck => "/check",
            Route::Emoji => "/emoji",
            Route::Confirmation => "/comfirmacao",
            Route::Dashboard => "/Dashboard",
        }
    }

    pub fn required_role(&self) -> Option<Role> {
        match self {
            Route::Login => None,
            Route::Registration | Route::StudentCheck | Route::Emoji | Route::Confirmation => {
                Some(Role::Student)
            }
            Route::CheckIn | Route::CheckOut | Route::Dashboard => Some(Role::Teacher),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    /// `None` only for routes open to everyone.
    Authorized(Option<User>),
    Unauthorized { redirect: &'static str },
}

impl GuardState {
    /// Settles a `Checking` guard once the session lookup has finished.
    pub fn resolve(self, route: Route, user: Option<User>) -> GuardState {
        if !matches!(self, GuardState::Checking) {
            return self;
        }

        let Some(required) = route.required_role() else {
            return GuardState::Authorized(user);
        };
        match user {
            Some(user) if user.role == required => GuardState::Authorized(Some(user)),
            _ => GuardState::Unauthorized {
                redirect: Route::Login.path(),
            },
        }
    }
}

/// Runs the session lookup for `route` and returns the settled guard state.
pub async fn check(
    route: Route,
    client: &BackendClient,
    cancel: &CancelToken,
) -> Result<GuardState, ApiError> {
    let state = GuardState::Checking;
    tracing::debug!(route = route.path(), "checking access");
    let user = client.session().current(client, cancel).await?;
    let state = state.resolve(route, user);
    if let GuardState::Unauthorized { redirect } = &state {
        tracing::info!(route = route.path(), redirect, "access denied");
    }
    Ok(state)
}
