#![allow(dead_code)]

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::Level;

/// Shared in-memory log sink.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures everything logged on the current thread while alive.
///
/// Use with the default (current-thread) `#[tokio::test]` runtime so that
/// the dispatcher runs on the thread the subscriber is installed on.
pub struct TestTracing {
    buf: SharedBuf,
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        Self {
            buf,
            _guard: guard,
        }
    }

    /// Everything logged so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buf.0.lock()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.output().contains(needle)
    }
}
