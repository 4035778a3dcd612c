//! Stream reassembler
//!
//! Accumulates streamed response fragments keyed by a logical identity
//! (session id or message id) until the backend signals end-of-stream.
//! Fragments are applied strictly in arrival order; the backend sends no
//! sequence numbers.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffers: HashMap<String, String>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the accumulator for `key`, opening one if
    /// absent. An empty fragment still opens the accumulator, so callers
    /// can distinguish "empty content" from "nothing streamed".
    pub fn append(&mut self, key: &str, fragment: &str) {
        self.buffers
            .entry(key.to_string())
            .or_default()
            .push_str(fragment);
    }

    /// Close the stream for `key`, returning the full concatenation exactly
    /// once. A second call without an intervening `append` returns `None`.
    pub fn finalize(&mut self, key: &str) -> Option<String> {
        self.buffers.remove(key)
    }

    /// Discard anything accumulated for `key`.
    pub fn reset(&mut self, key: &str) {
        self.buffers.remove(key);
    }

    /// Move an open accumulator to a new key. Used when the backend assigns
    /// a session id after fragments have already streamed in.
    pub fn rekey(&mut self, old: &str, new: &str) {
        if let Some(buffer) = self.buffers.remove(old) {
            self.buffers
                .entry(new.to_string())
                .or_default()
                .push_str(&buffer);
        }
    }

    pub fn is_open(&self, key: &str) -> bool {
        self.buffers.contains_key(key)
    }
}
