use crate::api::{AuthClient, DbClient, EnvConfig};
use crate::auth::SessionController;
use crate::models::Session;
use crate::storage::{clear_session, load_session, save_session};
use leptos::prelude::*;

#[derive(Clone, Copy)]
pub(crate) struct AppState {
    pub config: StoredValue<EnvConfig>,

    /// The signed-in user, if any. Persisted across reloads.
    pub session: RwSignal<Option<Session>>,

    /// Set once the persisted session has been revalidated.
    pub session_checked: RwSignal<bool>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            config: StoredValue::new(EnvConfig::from_window()),
            session: RwSignal::new(load_session()),
            session_checked: RwSignal::new(false),
        }
    }

    pub fn controller(&self) -> SessionController<AuthClient> {
        self.config.with_value(|cfg| {
            SessionController::new(AuthClient::new(cfg), cfg.password_min_length)
        })
    }

    pub fn db_client(&self, session: &Session) -> DbClient {
        self.config
            .with_value(|cfg| DbClient::new(cfg).with_session(session))
    }

    pub fn set_session(&self, session: Option<Session>) {
        match &session {
            Some(s) => save_session(s),
            None => clear_session(),
        }
        self.session.set(session);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct AppContext(pub AppState);
