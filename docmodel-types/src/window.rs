//! Session-scoped window numbers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Last handed-out window number. Monotonic for the process lifetime.
static LAST_WINDOW_NO: AtomicU32 = AtomicU32::new(1);

/// Instance tag distinguishing live documents of the same entity within a
/// process (each loaded or created document gets a fresh one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowNo(pub u32);

impl WindowNo {
    /// Allocate the next window number (increment-and-get).
    pub fn next() -> Self {
        WindowNo(LAST_WINDOW_NO.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
