//! Lazy, single-flight startup of the storage provider.
//!
//! The provider is created by the first request that needs it. Requests arriving while it is
//! being created wait on that same attempt and share its outcome, success or failure. A failed
//! attempt leaves the lifecycle uninitialized so a later request can try again.
//!
//! Shutdown is final. Once the provider is released, requests get [GatewayError::Closed].
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};

use crate::drive::Provider;
use crate::error::GatewayError;

type Outcome<P> = Result<Arc<P>, Arc<GatewayError>>;

/// Creates a provider. Called at most once at a time.
pub type Init<P> = Box<dyn Fn() -> Result<P, GatewayError> + Send + Sync>;

/// An initialization attempt in flight.
struct Pending<P> {
    outcome: Mutex<Option<Outcome<P>>>,
    settled: Condvar,
}

impl<P> Pending<P> {
    fn new() -> Pending<P> {
        Pending {
            outcome: Mutex::new(None),
            settled: Condvar::new(),
        }
    }

    fn settle(&self, outcome: Outcome<P>) {
        *lock(&self.outcome) = Some(outcome);
        self.settled.notify_all();
    }

    fn wait(&self) -> Outcome<P> {
        let mut guard = lock(&self.outcome);
        loop {
            if let Some(v) = guard.as_ref() {
                return v.clone();
            }
            guard = self.settled.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum State<P> {
    Uninitialized,
    Initializing(Arc<Pending<P>>),
    Ready(Arc<P>),
    Closed,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the storage provider handle.
pub struct Lifecycle<P> {
    state: Mutex<State<P>>,
    init: Init<P>,
}

impl<P: Provider> Lifecycle<P> {
    pub fn new(init: Init<P>) -> Lifecycle<P> {
        Lifecycle {
            state: Mutex::new(State::Uninitialized),
            init,
        }
    }

    /// Get the provider, creating it if this is the first call.
    pub fn get(&self) -> Result<Arc<P>, GatewayError> {
        let mut state = lock(&self.state);
        let in_flight = match &*state {
            State::Ready(v) => {
                return Ok(v.clone());
            },
            State::Initializing(v) => Some(v.clone()),
            State::Uninitialized => None,
            State::Closed => {
                return Err(GatewayError::Closed);
            },
        };
        match in_flight {
            Some(p) => {
                drop(state);
                debug!("provider initialization in progress, waiting");
                p.wait().map_err(GatewayError::Init)
            },
            None => {
                let p = Arc::new(Pending::new());
                *state = State::Initializing(p.clone());
                drop(state);
                self.initialize(p).map_err(GatewayError::Init)
            },
        }
    }

    fn initialize(&self, pending: Arc<Pending<P>>) -> Outcome<P> {
        info!("initializing storage provider");
        let outcome = match (self.init)() {
            Ok(v) => Ok(Arc::new(v)),
            Err(e) => {
                error!("storage provider initialization failed: {}", e.report());
                Err(Arc::new(e))
            },
        };
        {
            let mut state = lock(&self.state);
            *state = match &outcome {
                Ok(v) => State::Ready(v.clone()),
                Err(_) => State::Uninitialized,
            };
        }
        pending.settle(outcome.clone());
        outcome
    }

    /// Whether a provider is currently held.
    pub fn is_ready(&self) -> bool {
        matches!(&*lock(&self.state), State::Ready(_))
    }

    /// Release the provider for good.
    ///
    /// Waits for an in-flight initialization to settle first. Calling this again, or on a
    /// lifecycle that never initialized, does nothing.
    pub fn shutdown(&self) -> Result<(), GatewayError> {
        let previous = loop {
            let mut state = lock(&self.state);
            let pending = match &*state {
                State::Initializing(v) => Some(v.clone()),
                _ => None,
            };
            let pending = match pending {
                Some(v) => v,
                None => {
                    break std::mem::replace(&mut *state, State::Closed);
                },
            };
            drop(state);
            debug!("waiting for provider initialization before shutdown");
            let _ = pending.wait();
        };
        match previous {
            State::Ready(v) => {
                info!("closing storage provider");
                v.close()
            },
            _ => Ok(()),
        }
    }
}
