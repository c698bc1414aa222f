use crate::models::Session;
use serde::{Deserialize, Serialize};

pub(crate) const SESSION_KEY: &str = "notepad_session";

pub(crate) fn load_json_from_storage<T: for<'de> Deserialize<'de>>(key: &str) -> Option<T> {
    let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten())?;
    let json = storage.get_item(key).ok().flatten()?;
    serde_json::from_str(&json).ok()
}

pub(crate) fn save_json_to_storage<T: Serialize>(key: &str, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
            let _ = storage.set_item(key, &json);
        }
    }
}

pub(crate) fn load_session() -> Option<Session> {
    load_json_from_storage::<Session>(SESSION_KEY)
}

pub(crate) fn save_session(session: &Session) {
    save_json_to_storage(SESSION_KEY, session);
}

pub(crate) fn clear_session() {
    if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
        let _ = storage.remove_item(SESSION_KEY);
    }
}
