//! Adaptive connection selection.
//!
//! [`AdaptiveSelector`] walks an ordered list of candidate configurations and
//! binds a store to the first one that connects. Candidates are tried one at
//! a time, in input order; nothing after the first success is attempted.
//!
//! Each step is reported as a [`SelectionEvent`] to an optional observer and
//! through `tracing`. A candidate that names neither a socket nor root nodes
//! is reported as [`SelectionEvent::Invalid`] and skipped like a candidate
//! that failed to connect.

use crate::config::{CandidateConfig, StoreConfig};
use crate::connection::Topology;
use crate::factory::{connect_store, Connector, RedisConnector};
use crate::store::RedisStore;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// One step of a selection run.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    /// About to connect to the candidate at `index`.
    Attempting {
        /// Position in the candidate list.
        index: usize,
        /// Topology the candidate names.
        topology: Topology,
    },
    /// The candidate at `index` connected; selection stops here.
    Connected {
        /// Position in the candidate list.
        index: usize,
        /// Topology the candidate names.
        topology: Topology,
    },
    /// The candidate at `index` failed to connect.
    Failed {
        /// Position in the candidate list.
        index: usize,
        /// Topology the candidate names.
        topology: Topology,
        /// Why it failed.
        error: Error,
    },
    /// The candidate at `index` names no usable topology.
    Invalid {
        /// Position in the candidate list.
        index: usize,
        /// Why it was rejected.
        error: Error,
    },
}

type Observer = Arc<dyn Fn(&SelectionEvent) + Send + Sync>;

/// Tries candidate configurations in order until one connects.
#[derive(Clone)]
pub struct AdaptiveSelector<C = RedisConnector> {
    connector: C,
    observer: Option<Observer>,
}

impl AdaptiveSelector<RedisConnector> {
    /// A selector connecting to real Redis nodes.
    pub fn redis() -> Self {
        Self::new(RedisConnector)
    }
}

impl<C: Connector> AdaptiveSelector<C> {
    /// A selector using `connector` for each attempt.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            observer: None,
        }
    }

    /// Registers a callback receiving every [`SelectionEvent`].
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&SelectionEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The connector used for each attempt.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn emit(&self, event: SelectionEvent) {
        match &event {
            SelectionEvent::Attempting { index, topology } => {
                tracing::debug!(index, %topology, "trying candidate configuration");
            }
            SelectionEvent::Connected { index, topology } => {
                tracing::info!(index, %topology, pid = std::process::id(), "connected to {}", topology);
            }
            SelectionEvent::Failed {
                index,
                topology,
                error,
            } => {
                tracing::warn!(index, %topology, %error, "could not connect {} with configuration at index:[{}]", topology, index);
            }
            SelectionEvent::Invalid { index, error } => {
                tracing::warn!(index, %error, "skipping configuration at index:[{}]", index);
            }
        }

        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Classifies and tries each candidate in order.
    ///
    /// # Errors
    /// Returns `ExhaustedCandidates` once every candidate was invalid or
    /// failed to connect.
    pub async fn select<I>(&self, candidates: I) -> Result<RedisStore>
    where
        I: IntoIterator<Item = CandidateConfig>,
    {
        let configs = candidates.into_iter().map(StoreConfig::try_from);
        self.run(configs).await
    }

    /// Tries already-classified configurations in order.
    ///
    /// # Errors
    /// Returns `ExhaustedCandidates` once every configuration failed.
    pub async fn select_configs<I>(&self, configs: I) -> Result<RedisStore>
    where
        I: IntoIterator<Item = StoreConfig>,
    {
        self.run(configs.into_iter().map(Ok)).await
    }

    async fn run<I>(&self, configs: I) -> Result<RedisStore>
    where
        I: IntoIterator<Item = Result<StoreConfig>>,
    {
        let mut attempted = 0;

        for (index, config) in configs.into_iter().enumerate() {
            attempted += 1;

            let config = match config {
                Ok(config) => config,
                Err(error) => {
                    self.emit(SelectionEvent::Invalid { index, error });
                    continue;
                }
            };

            let topology = config.topology();
            self.emit(SelectionEvent::Attempting { index, topology });

            match connect_store(&self.connector, config).await {
                Ok(store) => {
                    self.emit(SelectionEvent::Connected { index, topology });
                    return Ok(store);
                }
                Err(error) => {
                    self.emit(SelectionEvent::Failed {
                        index,
                        topology,
                        error,
                    });
                }
            }
        }

        Err(Error::ExhaustedCandidates { attempted })
    }
}

impl<C: fmt::Debug> fmt::Debug for AdaptiveSelector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveSelector")
            .field("connector", &self.connector)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Connects to the first reachable Redis configuration in `candidates`.
///
/// # Errors
/// Returns `ExhaustedCandidates` if none of them connects.
pub async fn redis_adaptive_connection<I>(candidates: I) -> Result<RedisStore>
where
    I: IntoIterator<Item = CandidateConfig>,
{
    AdaptiveSelector::redis().select(candidates).await
}
