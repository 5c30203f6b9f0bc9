//! Shared, lazily established connection handle with bounded retries.

use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

/// Opens connections on behalf of a [`ConnectionManager`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Cheaply cloneable handle shared by all requests (e.g. a pool).
    type Handle: Clone + Send + Sync + 'static;

    /// Make a single connection attempt. Retries are the manager's job.
    async fn connect(&self) -> anyhow::Result<Self::Handle>;

    /// Register connectivity listeners for a freshly established handle.
    /// Called exactly once per successful attempt.
    fn watch(&self, _handle: &Self::Handle, _events: EventSink<Self::Handle>) {}
}

/// How many times to try connecting and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Every attempt of a connection sequence failed.
///
/// Cloneable so all callers waiting on the same attempt get the same error.
#[derive(Debug, Clone, Error)]
#[error("unable to connect to database after {attempts} attempt(s): {reason}")]
pub struct ConnectionError {
    pub attempts: u32,
    pub reason: String,
}

/// Asynchronous connectivity notifications from the underlying client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The client hit an error; drop the cached handle.
    Error(String),
    /// The client lost its connection; drop the cached handle.
    Disconnected,
    /// The client recovered in place. Logged only.
    Reconnected,
}

type Attempt<H> = Shared<BoxFuture<'static, Result<H, ConnectionError>>>;

enum State<H> {
    Absent,
    Connecting { generation: u64, attempt: Attempt<H> },
    Connected { generation: u64, handle: H },
}

struct Inner<H> {
    state: State<H>,
    /// Bumped for every new attempt so late events from an old handle
    /// cannot clear a newer one.
    last_generation: u64,
}

impl<H> Inner<H> {
    fn invalidate(&mut self, generation: u64) -> bool {
        let current = matches!(
            &self.state,
            State::Connected { generation: g, .. } if *g == generation
        );
        if current {
            self.state = State::Absent;
        }
        current
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&self.state, State::Connected { generation: g, .. } if *g == generation)
    }
}

fn lock<H>(inner: &Mutex<Inner<H>>) -> MutexGuard<'_, Inner<H>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the process-wide database handle.
///
/// The mutex only guards state transitions and is never held across an
/// `.await`; waiting happens on the shared attempt future.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    policy: RetryPolicy,
    inner: Arc<Mutex<Inner<C::Handle>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: Arc<C>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Absent,
                last_generation: 0,
            })),
        }
    }

    /// Return the cached handle, joining or starting a connection attempt
    /// when there is none.
    pub async fn get(&self) -> Result<Connection<C::Handle>, ConnectionError> {
        let (generation, attempt) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;

            let pending = match &inner.state {
                State::Connected { generation, handle } => {
                    tracing::debug!(generation, "using cached database connection");
                    return Ok(self.connection(*generation, handle.clone()));
                }
                State::Connecting {
                    generation,
                    attempt,
                } => Some((*generation, attempt.clone())),
                State::Absent => None,
            };

            match pending {
                Some(pending) => pending,
                None => {
                    inner.last_generation += 1;
                    let generation = inner.last_generation;
                    let attempt = establish(self.connector.clone(), self.policy)
                        .boxed()
                        .shared();
                    inner.state = State::Connecting {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let result = attempt.await;

        // The first waiter to get here settles the state for everyone.
        let settled = {
            let mut inner = lock(&self.inner);
            let settling = matches!(
                &inner.state,
                State::Connecting { generation: g, .. } if *g == generation
            );
            if settling {
                inner.state = match &result {
                    Ok(handle) => State::Connected {
                        generation,
                        handle: handle.clone(),
                    },
                    Err(_) => State::Absent,
                };
            }
            settling
        };

        let handle = result?;
        if settled {
            self.connector.watch(&handle, self.sink(generation));
        }

        Ok(self.connection(generation, handle))
    }

    fn sink(&self, generation: u64) -> EventSink<C::Handle> {
        EventSink {
            generation,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn connection(&self, generation: u64, handle: C::Handle) -> Connection<C::Handle> {
        Connection {
            handle,
            events: self.sink(generation),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_connected(&self) -> bool {
        matches!(&lock(&self.inner).state, State::Connected { .. })
    }
}

async fn establish<C: Connector>(
    connector: Arc<C>,
    policy: RetryPolicy,
) -> Result<C::Handle, ConnectionError> {
    let mut attempt = 1;
    loop {
        match connector.connect().await {
            Ok(handle) => {
                tracing::info!(attempt, "database connected");
                return Ok(handle);
            }
            Err(err) if attempt < policy.max_attempts => {
                tracing::warn!(
                    attempt,
                    error = %format!("{err:#}"),
                    "database connection attempt failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(attempt, error = ?err, "failed to establish database connection");
                return Err(ConnectionError {
                    attempts: attempt,
                    reason: format!("{err:#}"),
                });
            }
        }
    }
}

/// Reports connectivity events for one specific connection generation.
pub struct EventSink<H> {
    generation: u64,
    inner: Weak<Mutex<Inner<H>>>,
}

impl<H> Clone for EventSink<H> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            inner: self.inner.clone(),
        }
    }
}

impl<H> EventSink<H> {
    pub fn emit(&self, event: ConnectionEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let generation = self.generation;

        match event {
            ConnectionEvent::Error(reason) => {
                tracing::error!(generation, %reason, "database connection error");
                lock(&inner).invalidate(generation);
            }
            ConnectionEvent::Disconnected => {
                tracing::warn!(
                    generation,
                    "database disconnected, connection will be re-established on next request"
                );
                lock(&inner).invalidate(generation);
            }
            ConnectionEvent::Reconnected => {
                tracing::info!(generation, "database reconnected");
            }
        }
    }

    /// Whether this generation is still the cached connection.
    pub fn is_current(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => lock(&inner).is_current(self.generation),
            None => false,
        }
    }
}

/// A handle handed out by [`ConnectionManager::get`].
pub struct Connection<H> {
    handle: H,
    events: EventSink<H>,
}

impl<H> Connection<H> {
    /// Report something the caller observed while using this handle.
    pub fn report(&self, event: ConnectionEvent) {
        self.events.emit(event);
    }
}

impl<H> Deref for Connection<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}
