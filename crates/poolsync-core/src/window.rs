//! Block-range splitting for batched log queries.

use serde::{Deserialize, Serialize};

/// An inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub from: u64,
    pub to: u64,
}

impl FetchWindow {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered.
    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `[from, to]` into consecutive windows of at most `size` blocks.
///
/// Windows never overlap and cover the range with no gaps; the final window
/// may be a single block. `from > to` yields nothing.
pub fn split_range(from: u64, to: u64, size: u64) -> Vec<FetchWindow> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        windows.push(FetchWindow::new(start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    windows
}
