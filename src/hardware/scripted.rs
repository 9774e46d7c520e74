use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;

use super::{FetchError, Fetcher};
use crate::domain::Snapshot;

/// Replays a queue of prepared outcomes, one per fetch.
///
/// Once the queue is empty every fetch fails with a connection failure, and the
/// optional token is cancelled so a test driving the full loop can stop it.
pub struct ScriptedFetcher {
    outcomes: Mutex<VecDeque<Result<Snapshot, FetchError>>>,
    attempts: AtomicU32,
    cancel_when_exhausted: Option<CancellationToken>,
}

impl ScriptedFetcher {
    pub fn new(outcomes: impl IntoIterator<Item = Result<Snapshot, FetchError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            attempts: AtomicU32::new(0),
            cancel_when_exhausted: None,
        }
    }

    /// A device that never answers
    pub fn always_failing() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn cancel_when_exhausted(mut self, token: CancellationToken) -> Self {
        self.cancel_when_exhausted = Some(token);
        self
    }

    pub fn push(&self, outcome: Result<Snapshot, FetchError>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None => {
                if let Some(token) = &self.cancel_when_exhausted {
                    token.cancel();
                }
                Err(FetchError::ConnectionFailure("device asleep".to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
