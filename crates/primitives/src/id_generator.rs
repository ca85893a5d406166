//! IdGenerator: unique `i64` IDs from a shared counter via range reservation
//!
//! ## Protocol
//!
//! A generator reserves a window of `batch_size` IDs with one remote
//! `get_and_add(batch_size)`: the counter's prior value is the window
//! `base`, and the IDs handed out are `[base, base + batch_size)`. Local
//! calls then draw `base + (delta - 1)` for `delta` in `1..=batch_size`
//! without further round trips.
//!
//! ## Concurrency
//!
//! `(delta, reservation, generation)` sit behind one mutex that is never held
//! across an await. The reservation is a shared future: every caller that
//! draws from a window awaits the same future, so nobody sees a window
//! before its `base` is known. A new reservation first waits for the
//! previous one to settle, so at most one remote reservation is in flight
//! per generator.
//!
//! Windows of generators sharing one counter never overlap because the
//! counter's `get_and_add` is atomic in the replicated state machine.
//!
//! ## Failure
//!
//! A failed reservation fails every caller composed on it. The generator
//! then forgets it (if no newer reservation replaced it), so the next call
//! reserves a fresh window.

use crate::config::PrimitivesConfig;
use crate::counter::AtomicCounter;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use quorum_core::{Error, Result};
use tracing::{debug, warn};

type Reservation = Shared<BoxFuture<'static, Result<i64>>>;

struct State {
    /// Slot of the current window taken by the latest caller, 1-based
    delta: i64,
    reservation: Option<Reservation>,
    /// Bumped for every new reservation
    generation: u64,
}

/// Batched unique-ID source over an [`AtomicCounter`]
pub struct IdGenerator {
    counter: AtomicCounter,
    batch_size: i64,
    state: Mutex<State>,
}

impl IdGenerator {
    /// Create a generator reserving `batch_size` IDs per remote call
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `batch_size < 1`.
    pub fn new(counter: AtomicCounter, batch_size: i64) -> Result<Self> {
        if batch_size < 1 {
            return Err(Error::invalid_argument(format!(
                "batch size must be at least 1, got {}",
                batch_size
            )));
        }
        Ok(Self {
            counter,
            batch_size,
            state: Mutex::new(State {
                delta: 0,
                reservation: None,
                generation: 0,
            }),
        })
    }

    /// Create a generator using `[id_generator] batch_size`
    pub fn from_config(counter: AtomicCounter, config: &PrimitivesConfig) -> Result<Self> {
        Self::new(counter, config.id_generator.batch_size)
    }

    /// IDs reserved per remote call
    pub fn batch_size(&self) -> i64 {
        self.batch_size
    }

    /// Return an ID no other call on any generator sharing the counter returns
    pub async fn next_id(&self) -> Result<i64> {
        let (reservation, offset, generation) = {
            let mut state = self.state.lock();
            state.delta += 1;
            let reservation = match state.reservation.clone() {
                Some(current) if state.delta <= self.batch_size => current,
                previous => {
                    state.delta = 1;
                    state.generation += 1;
                    let next = self.reserve(previous);
                    state.reservation = Some(next.clone());
                    next
                }
            };
            (reservation, state.delta - 1, state.generation)
        };

        match reservation.await {
            Ok(base) => Ok(base + offset),
            Err(e) => {
                let mut state = self.state.lock();
                if state.generation == generation && state.reservation.is_some() {
                    warn!(target: "quorum::primitives", generation, error = %e, "Discarding failed ID reservation");
                    state.reservation = None;
                }
                Err(e)
            }
        }
    }

    fn reserve(&self, previous: Option<Reservation>) -> Reservation {
        let counter = self.counter.clone();
        let batch_size = self.batch_size;
        async move {
            if let Some(previous) = previous {
                // Only ordering matters here; its callers observe its result
                let _ = previous.await;
            }
            let base = counter.get_and_add(batch_size).await?;
            debug!(target: "quorum::primitives", counter = %counter.name(), base, batch_size, "Reserved ID window");
            Ok(base)
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("counter", &self.counter.name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
