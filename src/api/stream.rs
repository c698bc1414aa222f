//! Realtime Database event stream.
//!
//! The store pushes `put` / `patch` events over `text/event-stream`. Each event
//! is folded into a local [`SnapshotTree`] so that subscribers always receive
//! the full subtree, never a diff.

use super::{ApiError, ApiResult};
use leptos::logging::warn;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// Cancellable handle for a live subscription.
///
/// Dropping the handle releases the underlying listener.
pub(crate) struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    Cancel(String),
    AuthRevoked,
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

pub(crate) fn parse_stream_event(name: &str, payload: &str) -> ApiResult<StreamEvent> {
    match name {
        "put" | "patch" => {
            let p: StreamPayload = serde_json::from_str(payload).map_err(ApiError::parse)?;
            if name == "put" {
                Ok(StreamEvent::Put {
                    path: p.path,
                    data: p.data,
                })
            } else {
                Ok(StreamEvent::Patch {
                    path: p.path,
                    data: p.data,
                })
            }
        }
        "keep-alive" => Ok(StreamEvent::KeepAlive),
        "cancel" => Ok(StreamEvent::Cancel(payload.trim_matches('"').to_string())),
        "auth_revoked" => Ok(StreamEvent::AuthRevoked),
        other => Err(ApiError::parse(format!("unknown stream event: {other}"))),
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Write `data` at `segs` below `node`. `null` removes; emptied objects vanish.
fn set_at(node: &mut Value, segs: &[&str], data: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = data;
        return;
    };

    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Some(map) = node.as_object_mut() else {
        return;
    };

    if rest.is_empty() {
        if data.is_null() {
            map.remove(*first);
        } else {
            map.insert(first.to_string(), data);
        }
    } else {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        let prune = child.is_null() || child.as_object().is_some_and(|m| m.is_empty());
        if prune {
            map.remove(*first);
        }
    }

    let empty = map.is_empty();
    if empty {
        *node = Value::Null;
    }
}

/// Materialized copy of one subscribed subtree.
#[derive(Clone, Debug, Default)]
pub(crate) struct SnapshotTree {
    root: Value,
}

impl SnapshotTree {
    pub fn snapshot(&self) -> &Value {
        &self.root
    }

    /// Fold one event in. Returns `true` when subscribers should be notified.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Put { path, data } => {
                set_at(&mut self.root, &segments(&path), data);
                true
            }
            StreamEvent::Patch { path, data } => {
                let Value::Object(children) = data else {
                    return false;
                };
                let base = segments(&path);
                for (k, v) in children {
                    let mut segs = base.clone();
                    segs.push(k.as_str());
                    set_at(&mut self.root, &segs, v);
                }
                true
            }
            StreamEvent::KeepAlive | StreamEvent::Cancel(_) | StreamEvent::AuthRevoked => false,
        }
    }
}

/// `EventSource.readyState` once the browser has given up on the stream.
pub(crate) const STREAM_CLOSED: u16 = 2;

/// Classify an `error` event. The browser retries dropped connections on its
/// own (state stays CONNECTING); only a closed stream is reported.
pub(crate) fn stream_error(ready_state: u16, url: &str) -> Option<ApiError> {
    if ready_state == STREAM_CLOSED {
        Some(ApiError::network(format!(
            "live update stream closed: {}",
            url.split('?').next().unwrap_or(url)
        )))
    } else {
        None
    }
}

type MessageListener = (&'static str, Closure<dyn FnMut(web_sys::MessageEvent)>);

fn detach(
    source: &web_sys::EventSource,
    listeners: &[MessageListener],
    on_failure: Option<&Closure<dyn FnMut(web_sys::Event)>>,
) {
    for (name, cb) in listeners {
        let _ = source.remove_event_listener_with_callback(name, cb.as_ref().unchecked_ref());
    }
    if let Some(cb) = on_failure {
        let _ = source.remove_event_listener_with_callback("error", cb.as_ref().unchecked_ref());
    }
    source.close();
}

/// Open an `EventSource` on `url` and emit full snapshots until cancelled.
///
/// `cancel`, `auth_revoked` and a stream the browser closed (e.g. the initial
/// request was rejected) are reported through `on_error`.
pub(crate) fn open_event_stream(
    url: &str,
    on_snapshot: Rc<dyn Fn(Value)>,
    on_error: Rc<dyn Fn(ApiError)>,
) -> ApiResult<Subscription> {
    let source = web_sys::EventSource::new(url)
        .map_err(|e| ApiError::network(format!("EventSource: {e:?}")))?;
    attach_stream_listeners(source, url, on_snapshot, on_error)
}

pub(crate) fn attach_stream_listeners(
    source: web_sys::EventSource,
    url: &str,
    on_snapshot: Rc<dyn Fn(Value)>,
    on_error: Rc<dyn Fn(ApiError)>,
) -> ApiResult<Subscription> {
    let tree = Rc::new(RefCell::new(SnapshotTree::default()));

    let mut listeners: Vec<MessageListener> = vec![];
    for name in ["put", "patch", "keep-alive", "cancel", "auth_revoked"] {
        let tree = tree.clone();
        let on_snapshot = on_snapshot.clone();
        let on_error = on_error.clone();
        let source2 = source.clone();

        let cb = Closure::<dyn FnMut(web_sys::MessageEvent)>::new(
            move |ev: web_sys::MessageEvent| {
                let payload = ev.data().as_string().unwrap_or_default();
                let event = match parse_stream_event(name, &payload) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("[stream] dropping malformed {name} event: {e}");
                        return;
                    }
                };

                match event {
                    StreamEvent::Cancel(reason) => {
                        source2.close();
                        on_error(ApiError::rejected(&format!("STREAM_CANCELLED: {reason}")));
                    }
                    StreamEvent::AuthRevoked => {
                        source2.close();
                        on_error(ApiError::unauthorized());
                    }
                    other => {
                        let snapshot = {
                            let mut t = tree.borrow_mut();
                            if !t.apply(other) {
                                return;
                            }
                            t.snapshot().clone()
                        };
                        on_snapshot(snapshot);
                    }
                }
            },
        );

        if let Err(e) =
            source.add_event_listener_with_callback(name, cb.as_ref().unchecked_ref())
        {
            detach(&source, &listeners, None);
            return Err(ApiError::network(format!("EventSource listener: {e:?}")));
        }
        listeners.push((name, cb));
    }

    let on_failure = {
        let source2 = source.clone();
        let url = url.to_string();
        Closure::<dyn FnMut(web_sys::Event)>::new(move |_ev: web_sys::Event| {
            match stream_error(source2.ready_state(), &url) {
                Some(e) => on_error(e),
                None => warn!("[stream] connection interrupted, reconnecting"),
            }
        })
    };
    if let Err(e) =
        source.add_event_listener_with_callback("error", on_failure.as_ref().unchecked_ref())
    {
        detach(&source, &listeners, None);
        return Err(ApiError::network(format!("EventSource listener: {e:?}")));
    }

    Ok(Subscription::new(move || {
        detach(&source, &listeners, Some(&on_failure));
        drop(listeners);
        drop(on_failure);
    }))
}


// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use std::cell::Cell;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    const URL: &str = "http://127.0.0.1:9/notes/uid-1.json";

    fn message(name: &str, data: &str) -> web_sys::MessageEvent {
        let init = web_sys::MessageEventInit::new();
        init.set_data(&JsValue::from_str(data));
        web_sys::MessageEvent::new_with_event_init_dict(name, &init).expect("message event")
    }

    fn error_event() -> web_sys::Event {
        web_sys::Event::new("error").expect("error event")
    }

    struct Seen {
        snapshots: Rc<RefCell<Vec<Value>>>,
        errors: Rc<Cell<usize>>,
    }

    fn attach(source: &web_sys::EventSource) -> (Seen, Subscription) {
        let seen = Seen {
            snapshots: Rc::new(RefCell::new(vec![])),
            errors: Rc::new(Cell::new(0)),
        };
        let snapshots = seen.snapshots.clone();
        let errors = seen.errors.clone();
        let sub = attach_stream_listeners(
            source.clone(),
            URL,
            Rc::new(move |v: Value| snapshots.borrow_mut().push(v)),
            Rc::new(move |_e: ApiError| errors.set(errors.get() + 1)),
        )
        .expect("listeners attach");
        (seen, sub)
    }

    #[wasm_bindgen_test]
    fn test_put_events_reach_subscriber() {
        let source = web_sys::EventSource::new(URL).expect("event source");
        let (seen, _sub) = attach(&source);

        source
            .dispatch_event(&message("put", r#"{"path":"/","data":{"-N1":{"content":"a"}}}"#))
            .expect("dispatch");
        source
            .dispatch_event(&message("keep-alive", "null"))
            .expect("dispatch");

        assert_eq!(seen.snapshots.borrow().len(), 1);
        assert_eq!(seen.snapshots.borrow()[0]["-N1"]["content"], "a");
        assert_eq!(seen.errors.get(), 0);
    }

    #[wasm_bindgen_test]
    fn test_error_reported_only_once_closed() {
        let source = web_sys::EventSource::new(URL).expect("event source");
        let (seen, _sub) = attach(&source);

        // Still connecting: the browser retries by itself.
        source.dispatch_event(&error_event()).expect("dispatch");
        assert_eq!(seen.errors.get(), 0);

        source.close();
        source.dispatch_event(&error_event()).expect("dispatch");
        assert_eq!(seen.errors.get(), 1);
    }

    #[wasm_bindgen_test]
    fn test_dropped_subscription_detaches_and_closes() {
        let source = web_sys::EventSource::new(URL).expect("event source");
        let (seen, sub) = attach(&source);
        drop(sub);

        assert_eq!(source.ready_state(), STREAM_CLOSED);
        source
            .dispatch_event(&message("put", r#"{"path":"/","data":{"-N1":{"content":"a"}}}"#))
            .expect("dispatch");
        source.dispatch_event(&error_event()).expect("dispatch");

        assert!(seen.snapshots.borrow().is_empty());
        assert_eq!(seen.errors.get(), 0);
    }
}
