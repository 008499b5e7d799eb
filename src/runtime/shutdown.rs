//! Process-wide shutdown token.
//!
//! The flag moves from false to true exactly once. The acceptor and every
//! worker read it at their own poll points; nobody waits for an
//! acknowledgment. The first request also fires a `mio::Waker` registered on
//! the acceptor's poll so a blocked accept wait returns.

use mio::Waker;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

pub struct Shutdown {
    requested: AtomicBool,
    waker: Waker,
}

impl Shutdown {
    /// Create a token that interrupts the poll `waker` is registered with.
    pub fn new(waker: Waker) -> Self {
        Self {
            requested: AtomicBool::new(false),
            waker,
        }
    }

    /// Request shutdown.
    ///
    /// Returns `true` for the call that flipped the flag and `false` for
    /// every later call, which has no further effect.
    pub fn request(&self) -> bool {
        // Release pairs with the Acquire in `is_requested` so a woken
        // acceptor observes the flag.
        if self.requested.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already requested");
            return false;
        }

        info!("Shutdown requested");
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake acceptor");
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
