//! In-memory identity provider and store used by unit tests.

use crate::api::stream::{SnapshotTree, StreamEvent};
use crate::api::{ApiError, ApiResult, Subscription};
use crate::auth::IdentityService;
use crate::models::Session;
use crate::repo::HierarchicalStore;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Default)]
struct IdentityState {
    accounts: BTreeMap<String, String>,
    min_password: usize,
    calls: usize,
}

#[derive(Clone)]
pub(crate) struct FakeIdentity {
    state: Rc<RefCell<IdentityState>>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(IdentityState {
                min_password: 6,
                ..Default::default()
            })),
        }
    }
}

impl FakeIdentity {
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.state
            .borrow_mut()
            .accounts
            .insert(email.to_string(), password.to_string());
        self
    }

    pub fn with_min_password(self, n: usize) -> Self {
        self.state.borrow_mut().min_password = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.state.borrow().calls
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.state.borrow().accounts.contains_key(email)
    }

    pub fn session_for(email: &str, expires_at_ms: i64) -> Session {
        Session {
            uid: format!("uid-{}", email.split('@').next().unwrap_or(email)),
            email: email.to_string(),
            id_token: "id-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            expires_at_ms,
        }
    }
}

impl IdentityService for FakeIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> ApiResult<Session> {
        let mut st = self.state.borrow_mut();
        st.calls += 1;
        if !email.contains('@') {
            return Err(ApiError::rejected("INVALID_EMAIL"));
        }
        match st.accounts.get(email) {
            None => Err(ApiError::rejected("EMAIL_NOT_FOUND")),
            Some(p) if p != password => Err(ApiError::rejected("INVALID_PASSWORD")),
            Some(_) => Ok(Self::session_for(email, i64::MAX)),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> ApiResult<Session> {
        let mut st = self.state.borrow_mut();
        st.calls += 1;
        if !email.contains('@') {
            return Err(ApiError::rejected("INVALID_EMAIL"));
        }
        if st.accounts.contains_key(email) {
            return Err(ApiError::rejected("EMAIL_EXISTS"));
        }
        if password.chars().count() < st.min_password {
            return Err(ApiError::rejected("WEAK_PASSWORD"));
        }
        st.accounts.insert(email.to_string(), password.to_string());
        Ok(Self::session_for(email, i64::MAX))
    }

    async fn refresh(&self, session: &Session) -> ApiResult<Session> {
        let mut st = self.state.borrow_mut();
        st.calls += 1;
        if !st.accounts.contains_key(&session.email) {
            return Err(ApiError::rejected("TOKEN_EXPIRED"));
        }
        Ok(Session {
            id_token: "refreshed-token".to_string(),
            expires_at_ms: i64::MAX,
            ..session.clone()
        })
    }
}

struct Subscriber {
    path: String,
    on_snapshot: Rc<dyn Fn(Value)>,
    active: Rc<Cell<bool>>,
}

#[derive(Default)]
struct StoreState {
    tree: SnapshotTree,
    subscribers: Vec<Subscriber>,
    calls: Vec<String>,
    next_id: u64,
    fail_writes: bool,
}

/// Single-process stand-in for the realtime database.
#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    state: Rc<RefCell<StoreState>>,
}

fn pointer(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

impl FakeStore {
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.active.get())
            .count()
    }

    pub fn value_at(&self, path: &str) -> Value {
        self.state
            .borrow()
            .tree
            .snapshot()
            .pointer(&pointer(path))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn seed(&self, path: &str, data: Value) {
        self.state.borrow_mut().tree.apply(StreamEvent::Put {
            path: pointer(path),
            data,
        });
    }

    fn write(&self, call: String, event: StreamEvent) -> ApiResult<()> {
        {
            let mut st = self.state.borrow_mut();
            st.calls.push(call);
            if st.fail_writes {
                return Err(ApiError::network("connection lost"));
            }
            st.tree.apply(event);
        }
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        // Collect first so callbacks may touch the store again.
        let pending: Vec<(Rc<dyn Fn(Value)>, Value)> = {
            let st = self.state.borrow();
            st.subscribers
                .iter()
                .filter(|s| s.active.get())
                .map(|s| {
                    let data = st
                        .tree
                        .snapshot()
                        .pointer(&pointer(&s.path))
                        .cloned()
                        .unwrap_or(Value::Null);
                    (s.on_snapshot.clone(), data)
                })
                .collect()
        };
        for (cb, data) in pending {
            cb(data);
        }
    }
}

impl HierarchicalStore for FakeStore {
    async fn push(&self, path: &str, record: Value) -> ApiResult<String> {
        let id = {
            let mut st = self.state.borrow_mut();
            st.next_id += 1;
            format!("-N{:06}", st.next_id)
        };
        self.write(
            format!("push {path}"),
            StreamEvent::Put {
                path: format!("{}/{}", pointer(path), id),
                data: record,
            },
        )?;
        Ok(id)
    }

    async fn update(&self, path: &str, partial: Value) -> ApiResult<()> {
        self.write(
            format!("update {path}"),
            StreamEvent::Patch {
                path: pointer(path),
                data: partial,
            },
        )
    }

    async fn remove(&self, path: &str) -> ApiResult<()> {
        self.write(
            format!("remove {path}"),
            StreamEvent::Put {
                path: pointer(path),
                data: Value::Null,
            },
        )
    }

    fn subscribe(
        &self,
        path: &str,
        on_snapshot: Rc<dyn Fn(Value)>,
        _on_error: Rc<dyn Fn(ApiError)>,
    ) -> ApiResult<Subscription> {
        let active = Rc::new(Cell::new(true));
        {
            let mut st = self.state.borrow_mut();
            st.calls.push(format!("subscribe {path}"));
            st.subscribers.push(Subscriber {
                path: path.to_string(),
                on_snapshot: on_snapshot.clone(),
                active: active.clone(),
            });
        }

        // The first event of a stream is the current subtree.
        on_snapshot(self.value_at(path));

        Ok(Subscription::new(move || active.set(false)))
    }
}
