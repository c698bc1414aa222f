use crate::api::stream::open_event_stream;
use crate::api::{ApiError, ApiResult, DbClient, Subscription};
use crate::models::{
    categories_from_snapshot, notes_from_snapshot, Category, CategoryRecord, Note, NoteFilter,
    NoteRecord, Session,
};
use leptos::logging::{log, warn};
use serde_json::Value;
use std::rc::Rc;

/// Remote tree-shaped key-value store addressed by slash-delimited paths.
pub(crate) trait HierarchicalStore {
    /// Insert `record` under a store-generated child id of `path`; returns the id.
    async fn push(&self, path: &str, record: Value) -> ApiResult<String>;
    async fn update(&self, path: &str, partial: Value) -> ApiResult<()>;
    async fn remove(&self, path: &str) -> ApiResult<()>;

    /// Deliver the full subtree at `path` on every change until the handle is dropped.
    fn subscribe(
        &self,
        path: &str,
        on_snapshot: Rc<dyn Fn(Value)>,
        on_error: Rc<dyn Fn(ApiError)>,
    ) -> ApiResult<Subscription>;
}

impl HierarchicalStore for DbClient {
    async fn push(&self, path: &str, record: Value) -> ApiResult<String> {
        self.push_record(path, &record).await
    }

    async fn update(&self, path: &str, partial: Value) -> ApiResult<()> {
        self.patch(path, &partial).await
    }

    async fn remove(&self, path: &str) -> ApiResult<()> {
        self.delete(path).await
    }

    fn subscribe(
        &self,
        path: &str,
        on_snapshot: Rc<dyn Fn(Value)>,
        on_error: Rc<dyn Fn(ApiError)>,
    ) -> ApiResult<Subscription> {
        open_event_stream(&self.url(path), on_snapshot, on_error)
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("note content is empty")]
    EmptyContent,
    #[error("category name is empty")]
    EmptyName,
    #[error(transparent)]
    Store(#[from] ApiError),
}

pub(crate) type RepoResult<T> = Result<T, RepoError>;

/// Notes and categories of one signed-in user.
#[derive(Clone)]
pub(crate) struct Repository<S> {
    store: S,
    uid: String,
}

impl<S: HierarchicalStore> Repository<S> {
    /// `None` without a session: nothing may be read or written.
    pub fn for_session(store: S, session: Option<&Session>) -> Option<Self> {
        let session = session?;
        if session.uid.trim().is_empty() {
            return None;
        }
        Some(Self {
            store,
            uid: session.uid.clone(),
        })
    }

    pub fn notes_path(&self) -> String {
        format!("notes/{}", self.uid)
    }

    pub fn categories_path(&self) -> String {
        format!("categories/{}", self.uid)
    }

    fn note_path(&self, note_id: &str) -> String {
        format!("notes/{}/{}", self.uid, note_id)
    }

    pub fn subscribe_notes(
        &self,
        on_notes: impl Fn(Vec<Note>) + 'static,
        on_error: Rc<dyn Fn(ApiError)>,
    ) -> ApiResult<Subscription> {
        let path = self.notes_path();
        log!("[repo] subscribing to {path}");
        self.store.subscribe(
            &path,
            Rc::new(move |data: Value| on_notes(notes_from_snapshot(&data))),
            on_error,
        )
    }

    pub fn subscribe_categories(
        &self,
        on_categories: impl Fn(Vec<Category>) + 'static,
        on_error: Rc<dyn Fn(ApiError)>,
    ) -> ApiResult<Subscription> {
        let path = self.categories_path();
        log!("[repo] subscribing to {path}");
        self.store.subscribe(
            &path,
            Rc::new(move |data: Value| on_categories(categories_from_snapshot(&data))),
            on_error,
        )
    }

    fn note_record(content: &str, filter: &NoteFilter) -> RepoResult<Value> {
        if content.trim().is_empty() {
            return Err(RepoError::EmptyContent);
        }
        let record = NoteRecord {
            content: content.to_string(),
            category: filter.resolve_category(),
        };
        serde_json::to_value(record).map_err(|e| RepoError::Store(ApiError::parse(e)))
    }

    /// Returns the push-generated id of the new note.
    pub async fn add_note(&self, content: &str, filter: &NoteFilter) -> RepoResult<String> {
        let record = Self::note_record(content, filter)?;
        let id = self
            .store
            .push(&self.notes_path(), record)
            .await
            .inspect_err(|e| warn!("[repo] add note failed: {e}"))?;
        Ok(id)
    }

    pub async fn update_note(
        &self,
        note_id: &str,
        content: &str,
        filter: &NoteFilter,
    ) -> RepoResult<()> {
        let record = Self::note_record(content, filter)?;
        self.store
            .update(&self.note_path(note_id), record)
            .await
            .inspect_err(|e| warn!("[repo] update note {note_id} failed: {e}"))?;
        Ok(())
    }

    /// A blank id is a no-op.
    pub async fn delete_note(&self, note_id: &str) -> RepoResult<()> {
        if note_id.trim().is_empty() {
            return Ok(());
        }
        self.store
            .remove(&self.note_path(note_id))
            .await
            .inspect_err(|e| warn!("[repo] delete note {note_id} failed: {e}"))?;
        Ok(())
    }

    /// Returns the push-generated id of the new category.
    pub async fn add_category(&self, name: &str) -> RepoResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepoError::EmptyName);
        }
        let record = serde_json::to_value(CategoryRecord {
            name: name.to_string(),
        })
        .map_err(|e| RepoError::Store(ApiError::parse(e)))?;

        let id = self
            .store
            .push(&self.categories_path(), record)
            .await
            .inspect_err(|e| warn!("[repo] add category failed: {e}"))?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNCATEGORIZED;
    use crate::testing::{FakeIdentity, FakeStore};
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::RefCell;

    fn session() -> Session {
        FakeIdentity::session_for("u@example.com", i64::MAX)
    }

    fn repo(store: &FakeStore) -> Repository<FakeStore> {
        Repository::for_session(store.clone(), Some(&session())).expect("session present")
    }

    fn no_errors() -> Rc<dyn Fn(ApiError)> {
        Rc::new(|e: ApiError| panic!("unexpected stream error: {e}"))
    }

    /// Subscribe and collect every emitted notes snapshot.
    fn watch_notes(repo: &Repository<FakeStore>) -> (Rc<RefCell<Vec<Vec<Note>>>>, Subscription) {
        let seen: Rc<RefCell<Vec<Vec<Note>>>> = Rc::new(RefCell::new(vec![]));
        let s = seen.clone();
        let sub = repo
            .subscribe_notes(move |notes| s.borrow_mut().push(notes), no_errors())
            .expect("subscribe");
        (seen, sub)
    }

    #[test]
    fn test_no_session_no_repository_no_subscription() {
        let store = FakeStore::default();
        let repo = Repository::for_session(store.clone(), None);
        assert!(repo.is_none());
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_paths_are_scoped_by_uid() {
        let store = FakeStore::default();
        let r = repo(&store);
        assert_eq!(r.notes_path(), format!("notes/{}", session().uid));
        assert_eq!(r.categories_path(), format!("categories/{}", session().uid));
    }

    #[test]
    fn test_blank_content_never_reaches_store() {
        let store = FakeStore::default();
        let r = repo(&store);

        for content in ["", " ", "\n\t  "] {
            assert!(matches!(
                block_on(r.add_note(content, &NoteFilter::All)),
                Err(RepoError::EmptyContent)
            ));
            assert!(matches!(
                block_on(r.update_note("-N1", content, &NoteFilter::All)),
                Err(RepoError::EmptyContent)
            ));
        }
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_add_note_round_trip_through_snapshot() {
        let store = FakeStore::default();
        let r = repo(&store);
        let (seen, _sub) = watch_notes(&r);
        assert_eq!(seen.borrow().last().map(|n| n.len()), Some(0));

        let id = block_on(r.add_note("buy milk\nand eggs", &NoteFilter::All)).expect("add");

        let latest = seen.borrow().last().cloned().expect("snapshot emitted");
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, id);
        assert_eq!(latest[0].content, "buy milk\nand eggs");
        assert_eq!(latest[0].category, UNCATEGORIZED);
    }

    #[test]
    fn test_add_note_under_category_filter() {
        let store = FakeStore::default();
        let r = repo(&store);
        let cat = block_on(r.add_category("Work")).expect("add category");

        block_on(r.add_note("standup", &NoteFilter::Category(cat.clone()))).expect("add");

        let stored = store.value_at(&r.notes_path());
        let notes = notes_from_snapshot(&stored);
        assert_eq!(notes[0].category, cat);
    }

    #[test]
    fn test_update_note_resolves_category_from_filter() {
        let store = FakeStore::default();
        let r = repo(&store);
        let id = block_on(r.add_note("a", &NoteFilter::Category("-C1".to_string()))).expect("add");

        block_on(r.update_note(&id, "b", &NoteFilter::All)).expect("update");

        let notes = notes_from_snapshot(&store.value_at(&r.notes_path()));
        assert_eq!(notes[0].content, "b");
        assert_eq!(notes[0].category, UNCATEGORIZED);
    }

    #[test]
    fn test_delete_note_and_blank_id_noop() {
        let store = FakeStore::default();
        let r = repo(&store);
        let id = block_on(r.add_note("a", &NoteFilter::All)).expect("add");
        let calls_before = store.calls().len();

        block_on(r.delete_note("  ")).expect("blank id is a no-op");
        assert_eq!(store.calls().len(), calls_before);

        block_on(r.delete_note(&id)).expect("delete");
        assert_eq!(store.value_at(&r.notes_path()), Value::Null);
    }

    #[test]
    fn test_add_category_rejects_blank_name() {
        let store = FakeStore::default();
        let r = repo(&store);
        assert!(matches!(block_on(r.add_category("   ")), Err(RepoError::EmptyName)));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_categories_subscription_emits_full_snapshots() {
        let store = FakeStore::default();
        let r = repo(&store);
        let seen: Rc<RefCell<Vec<Vec<Category>>>> = Rc::new(RefCell::new(vec![]));
        let s = seen.clone();
        let _sub = r
            .subscribe_categories(move |cats| s.borrow_mut().push(cats), no_errors())
            .expect("subscribe");

        block_on(r.add_category("Work")).expect("add");
        block_on(r.add_category("Home")).expect("add");

        let latest = seen.borrow().last().cloned().expect("emitted");
        let names: Vec<&str> = latest.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Work", "Home"]);
    }

    #[test]
    fn test_dropped_subscription_stops_emitting() {
        let store = FakeStore::default();
        let r = repo(&store);
        let (seen, sub) = watch_notes(&r);
        drop(sub);

        block_on(r.add_note("a", &NoteFilter::All)).expect("add");
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let store = FakeStore::default();
        let r = repo(&store);
        store.fail_writes(true);

        let err = block_on(r.add_note("a", &NoteFilter::All)).expect_err("store down");
        assert!(matches!(err, RepoError::Store(_)));
        assert_eq!(store.value_at(&r.notes_path()), Value::Null);
    }

    #[test]
    fn test_other_users_data_is_invisible() {
        let store = FakeStore::default();
        store.seed("notes/someone-else", json!({"-N1": {"content": "secret"}}));
        let r = repo(&store);
        let (seen, _sub) = watch_notes(&r);
        assert!(seen.borrow()[0].is_empty());
    }
}
