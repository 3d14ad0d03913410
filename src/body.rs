//! Request and response bodies.
//!
//! Most framework responses are small buffered payloads (JSON errors,
//! redirects, plain text). Deferred data and rendered documents may be
//! streamed, so the body carries a boxed stream of discrete chunks. A chunk
//! is never split by the producer: one deferred frame is one chunk.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Mutex;

/// Streamed body chunks.
///
/// The stream sits behind a mutex only so that `Body` is `Sync` and a
/// `&Request` can be held across await points. It is never locked while
/// polling: consumers take the stream out with [`ChunkStream::into_inner`].
pub struct ChunkStream(Mutex<BoxStream<'static, Bytes>>);

impl ChunkStream {
    #[must_use]
    pub fn into_inner(self) -> BoxStream<'static, Bytes> {
        self.0.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// HTTP body used for both requests and responses.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(ChunkStream),
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Wrap a stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Bytes> + Send + 'static,
    {
        Body::Stream(ChunkStream(Mutex::new(stream.boxed())))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// Turn any body into a chunk stream.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Bytes> {
        match self {
            Body::Empty => stream::empty().boxed(),
            Body::Full(bytes) => stream::once(async move { bytes }).boxed(),
            Body::Stream(s) => s.into_inner(),
        }
    }

    /// Buffer the whole body.
    pub async fn collect(self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Full(bytes) => bytes,
            Body::Stream(s) => {
                let mut s = s.into_inner();
                let mut buf = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk);
                }
                buf.freeze()
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

/// Request type handled by the dispatcher.
pub type Request = http::Request<Body>;
/// Response type produced by the dispatcher.
pub type Response = http::Response<Body>;
