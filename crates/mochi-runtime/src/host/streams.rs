use std::collections::HashMap;

use mochi_peers::Duplex;
use tracing::debug;

/// Streams opened by one script call, reaped on every return path. Starlark
/// scripts address them by an opaque integer id rather than holding the
/// underlying I/O object directly (Starlark has no notion of an
/// `AsyncRead + AsyncWrite` value).
#[derive(Default)]
pub struct OpenStreams {
    next_id: u64,
    streams: HashMap<u64, Box<dyn Duplex>>,
}

impl OpenStreams {
    pub fn new() -> Self {
        OpenStreams::default()
    }

    pub fn insert(&mut self, io: Box<dyn Duplex>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.streams.insert(id, io);
        id
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Box<dyn Duplex>> {
        self.streams.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<Box<dyn Duplex>> {
        self.streams.remove(&id)
    }
}

impl Drop for OpenStreams {
    fn drop(&mut self) {
        if !self.streams.is_empty() {
            debug!(count = self.streams.len(), "closing streams left open at call return");
        }
    }
}
