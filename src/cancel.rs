//! Cancellation tokens for in-flight responses
//!
//! A [`TokenIssuer`] hands out monotonically numbered [`StreamToken`]s. Minting
//! a new token (or calling [`TokenIssuer::invalidate`]) advances the shared
//! generation, so every older token reports itself invalid from then on.
//! Invalidation also cancels the token's [`CancellationToken`] so the
//! transport can stop reading; correctness only depends on the generation
//! check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Issues stream tokens; at most one token is valid at a time
#[derive(Debug, Default)]
pub struct TokenIssuer {
    generation: Arc<AtomicU64>,
    abort: Mutex<Option<CancellationToken>>,
}

impl TokenIssuer {
    /// Creates an issuer with no valid token
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates all previous tokens and returns a fresh one
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::cancel::TokenIssuer;
    ///
    /// let issuer = TokenIssuer::new();
    /// let first = issuer.mint();
    /// let second = issuer.mint();
    /// assert!(!first.is_valid());
    /// assert!(second.is_valid());
    /// ```
    pub fn mint(&self) -> StreamToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let abort = CancellationToken::new();
        if let Some(previous) = self.swap_abort(Some(abort.clone())) {
            previous.cancel();
        }
        StreamToken {
            generation,
            current: Arc::clone(&self.generation),
            abort,
        }
    }

    /// Invalidates the current token without issuing a new one
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.swap_abort(None) {
            previous.cancel();
        }
    }

    fn swap_abort(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        match self.abort.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

/// Handle gating whether one stream may still mutate shared state
#[derive(Debug, Clone)]
pub struct StreamToken {
    generation: u64,
    current: Arc<AtomicU64>,
    abort: CancellationToken,
}

impl StreamToken {
    /// True while no newer token has been minted and no invalidation happened
    pub fn is_valid(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Generation number of this token
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Signal cancelled when this token is superseded
    pub fn abort_signal(&self) -> CancellationToken {
        self.abort.clone()
    }
}

impl PartialEq for StreamToken {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation && Arc::ptr_eq(&self.current, &other.current)
    }
}

impl Eq for StreamToken {}
