//! # Deferred Data
//!
//! A loader may return some values immediately and others as futures that
//! settle later. The response is streamed as `text/remix-deferred`:
//!
//! ```text
//! {"user":{"id":1},"reviews":"__deferred_promise:reviews"}
//!
//! data:{"reviews":[...]}
//!
//! error:{"stats":{"message":"Unexpected Server Error"}}
//!
//! ```
//!
//! The first frame carries every critical value plus a placeholder for each
//! deferred key. Afterwards one frame is written per deferred key, in the
//! order the keys settle. The stream ends once every key has been written,
//! or as soon as the request is cancelled.
//!
//! Each deferred key moves `pending → resolved | rejected` exactly once;
//! [`TrackedValue`] makes the terminal states unrepresentable as a source of
//! further transitions.

use crate::body::Body;
use crate::errors::{serialize_error, RouteError};
use crate::mode::ServerMode;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Placeholder prefix written in the first frame for every deferred key.
pub const DEFERRED_VALUE_PLACEHOLDER_PREFIX: &str = "__deferred_promise:";

/// Future backing a deferred value.
pub type DeferredFuture = BoxFuture<'static, Result<Value, RouteError>>;

/// Observable state of a [`TrackedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Resolved,
    Rejected,
}

/// A deferred value and its settlement state.
pub enum TrackedValue {
    Pending(DeferredFuture),
    Resolved(Value),
    Rejected(RouteError),
}

impl TrackedValue {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, RouteError>> + Send + 'static,
    {
        TrackedValue::Pending(future.boxed())
    }

    #[must_use]
    pub fn state(&self) -> DeferredState {
        match self {
            TrackedValue::Pending(_) => DeferredState::Pending,
            TrackedValue::Resolved(_) => DeferredState::Resolved,
            TrackedValue::Rejected(_) => DeferredState::Rejected,
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state() != DeferredState::Pending
    }

    /// Wait for the value to settle. Settled values are returned unchanged.
    pub async fn settle(self) -> Self {
        match self {
            TrackedValue::Pending(future) => match future.await {
                Ok(value) => TrackedValue::Resolved(value),
                Err(err) => TrackedValue::Rejected(err),
            },
            settled => settled,
        }
    }
}

impl fmt::Debug for TrackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedValue::Pending(_) => f.write_str("TrackedValue::Pending(..)"),
            TrackedValue::Resolved(v) => f.debug_tuple("TrackedValue::Resolved").field(v).finish(),
            TrackedValue::Rejected(e) => f.debug_tuple("TrackedValue::Rejected").field(e).finish(),
        }
    }
}

/// One named entry of a deferred payload.
#[derive(Debug)]
pub enum DeferredEntry {
    /// Sent in the first frame.
    Critical(Value),
    /// Streamed once settled.
    Tracked(TrackedValue),
}

/// Named critical and deferred values plus the response init they were
/// returned with.
#[derive(Debug)]
pub struct DeferredData {
    entries: Vec<(String, DeferredEntry)>,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Default for DeferredData {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredData {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    /// Insert or replace an entry; replaced keys keep their position.
    pub fn insert(&mut self, key: impl Into<String>, entry: DeferredEntry) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, DeferredEntry::Critical(value));
        self
    }

    #[must_use]
    pub fn with_tracked(mut self, key: impl Into<String>, value: TrackedValue) -> Self {
        self.insert(key, DeferredEntry::Tracked(value));
        self
    }

    /// Add a value that streams once `future` settles.
    #[must_use]
    pub fn with_deferred<F>(self, key: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<Value, RouteError>> + Send + 'static,
    {
        self.with_tracked(key, TrackedValue::pending(future))
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[(String, DeferredEntry)] {
        &self.entries
    }

    /// Keys still waiting to settle.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e, DeferredEntry::Tracked(t) if !t.is_settled()))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Split into the response init and the entries.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<(String, DeferredEntry)>) {
        (self.status, self.headers, self.entries)
    }
}

fn frame(prefix: &str, key: &str, value: Value) -> Bytes {
    let mut obj = Map::with_capacity(1);
    obj.insert(key.to_string(), value);
    Bytes::from(format!("{prefix}{}\n\n", Value::Object(obj)))
}

fn rejection_value(err: &RouteError, mode: ServerMode) -> Value {
    match err {
        RouteError::Error(err) => json!(serialize_error(err, mode)),
        RouteError::Response(resp) => json!({
            "status": resp.status.as_u16(),
            "statusText": resp.status_text,
            "internal": resp.internal,
            "data": resp.data,
        }),
        RouteError::Value(value) => value.clone(),
    }
}

/// Encode a settled value as a `data:` or `error:` frame.
fn settled_frame(key: &str, value: TrackedValue, mode: ServerMode) -> Option<Bytes> {
    match value {
        TrackedValue::Resolved(value) => Some(frame("data:", key, value)),
        TrackedValue::Rejected(err) => Some(frame("error:", key, rejection_value(&err, mode))),
        TrackedValue::Pending(_) => None,
    }
}

type Settlement = BoxFuture<'static, (String, TrackedValue)>;

struct EncoderState {
    queued: VecDeque<Bytes>,
    pending: FuturesUnordered<Settlement>,
    signal: CancellationToken,
    mode: ServerMode,
}

/// Turn deferred entries into a streamed body.
///
/// The initial frame and frames for already-settled keys are produced up
/// front. Pending keys are polled together and written as they settle; a
/// cancelled `signal` ends the stream before the next write and drops the
/// remaining futures.
#[must_use]
pub fn create_deferred_stream(
    entries: Vec<(String, DeferredEntry)>,
    signal: CancellationToken,
    mode: ServerMode,
) -> Body {
    let mut critical = Map::with_capacity(entries.len());
    let mut presettled = Vec::new();
    let pending = FuturesUnordered::new();

    for (key, entry) in entries {
        match entry {
            DeferredEntry::Critical(value) => {
                critical.insert(key, value);
            }
            DeferredEntry::Tracked(tracked) => {
                critical.insert(
                    key.clone(),
                    Value::String(format!("{DEFERRED_VALUE_PLACEHOLDER_PREFIX}{key}")),
                );
                if tracked.is_settled() {
                    presettled.push((key, tracked));
                } else {
                    let settlement: Settlement =
                        async move { (key, tracked.settle().await) }.boxed();
                    pending.push(settlement);
                }
            }
        }
    }

    let mut queued = VecDeque::with_capacity(1 + presettled.len());
    queued.push_back(Bytes::from(format!("{}\n\n", Value::Object(critical))));
    queued.extend(
        presettled
            .into_iter()
            .filter_map(|(key, value)| settled_frame(&key, value, mode)),
    );

    debug!(
        pending = pending.len(),
        queued = queued.len(),
        "Deferred stream created"
    );

    let state = EncoderState {
        queued,
        pending,
        signal,
        mode,
    };

    Body::from_stream(stream::unfold(state, |mut state| async move {
        if let Some(frame) = state.queued.pop_front() {
            return Some((frame, state));
        }
        if state.pending.is_empty() || state.signal.is_cancelled() {
            return None;
        }

        let settled = {
            let EncoderState {
                pending, signal, ..
            } = &mut state;
            tokio::select! {
                biased;
                () = signal.cancelled() => None,
                next = pending.next() => next,
            }
        };

        match settled {
            Some((key, value)) if !state.signal.is_cancelled() => {
                debug!(key = %key, state = ?value.state(), "Deferred value settled");
                let frame = settled_frame(&key, value, state.mode)?;
                Some((frame, state))
            }
            _ => {
                debug!(
                    remaining = state.pending.len(),
                    "Deferred stream cancelled"
                );
                None
            }
        }
    }))
}
