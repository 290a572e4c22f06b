//! In-memory, append-only room history.
//!
//! The [`HistoryLog`] records every normalized frame the relay has broadcast,
//! in broadcast order, for the lifetime of the process. It is replayed in full
//! to each connection that joins. There is no eviction and no size cap.
//!
//! The log has a single owner (the broadcaster task), so it carries no lock
//! of its own.

use roomcast_proto::frame::Frame;

/// Ordered record of every broadcast frame.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<Frame>,
}

impl HistoryLog {
    /// Creates an empty history log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a frame, returning its position in the log.
    pub fn append(&mut self, frame: Frame) -> usize {
        self.entries.push(frame);
        self.entries.len() - 1
    }

    /// Iterates the recorded frames in broadcast order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Frame> {
        self.entries.iter()
    }

    /// Returns the recorded frames as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Frame] {
        &self.entries
    }

    /// Number of recorded frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been broadcast yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
