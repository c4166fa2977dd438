use super::cached_data::FetchOutcome;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type Shared<T> = Option<Arc<Result<FetchOutcome<T>>>>;

/// Single-flight table keyed by cache key.
///
/// The first caller for a key becomes the leader and performs the read.
/// Callers arriving while it runs wait for the leader's result, success
/// or failure, instead of issuing their own.
#[derive(Debug)]
pub struct InFlight<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Shared<T>>>>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

/// Outcome of [`InFlight::join`]
#[derive(Debug)]
pub enum InFlightRole<'a, T: Clone> {
    Leader(Leader<'a, T>),
    Follower(Follower<T>),
}

/// Owns the read for one key until [`Leader::complete`] or drop
#[derive(Debug)]
pub struct Leader<'a, T: Clone> {
    owner: &'a InFlight<T>,
    key: String,
    tx: Option<watch::Sender<Shared<T>>>,
}

/// Waits on another caller's read
#[derive(Debug)]
pub struct Follower<T> {
    rx: watch::Receiver<Shared<T>>,
}

impl<T: Clone> InFlight<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, key: &str) -> InFlightRole<'_, T> {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = calls.get(key) {
            return InFlightRole::Follower(Follower { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        calls.insert(key.to_string(), rx);
        InFlightRole::Leader(Leader {
            owner: self,
            key: key.to_string(),
            tx: Some(tx),
        })
    }

    /// Number of keys with a read in progress.
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl<T: Clone> Leader<'_, T> {
    /// Publishes a copy of `result` to every follower and frees the key.
    pub fn complete(mut self, result: &Result<FetchOutcome<T>>) {
        self.owner.remove(&self.key);
        if let Some(tx) = self.tx.take() {
            let shared = result.as_ref().map(Clone::clone).map_err(|e| e.replicate());
            tx.send_replace(Some(Arc::new(shared)));
        }
    }
}

impl<T: Clone> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        // abandoned without a result; followers see the sender close
        if self.tx.is_some() {
            self.owner.remove(&self.key);
        }
    }
}

impl<T: Clone> Follower<T> {
    /// The leader's result, or `None` if the leader was dropped first.
    pub async fn wait(mut self) -> Option<Result<FetchOutcome<T>>> {
        let shared = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => Option::clone(&value),
            Err(_) => None,
        }?;
        Some(match shared.as_ref() {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => Err(e.replicate()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn expect_leader<T: Clone>(role: InFlightRole<'_, T>) -> Leader<'_, T> {
        match role {
            InFlightRole::Leader(leader) => leader,
            InFlightRole::Follower(_) => panic!("expected to lead"),
        }
    }

    fn expect_follower<T: Clone>(role: InFlightRole<'_, T>) -> Follower<T> {
        match role {
            InFlightRole::Follower(follower) => follower,
            InFlightRole::Leader(_) => panic!("expected to follow"),
        }
    }

    #[tokio::test]
    async fn test_follower_receives_leader_outcome() {
        let in_flight = InFlight::<u32>::new();
        let leader = expect_leader(in_flight.join("json_UserData"));
        let follower = expect_follower(in_flight.join("json_UserData"));
        assert_eq!(in_flight.len(), 1);

        leader.complete(&Ok(FetchOutcome::new(vec![1, 2])));
        assert!(in_flight.is_empty());
        assert_eq!(follower.wait().await.unwrap().unwrap().data, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_follower_receives_leader_error() {
        let in_flight = InFlight::<u32>::new();
        let leader = expect_leader(in_flight.join("csv_UserData"));
        let follower = expect_follower(in_flight.join("csv_UserData"));

        let waiter = tokio::spawn(follower.wait());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        leader.complete(&Err(Error::Transport { status: 500, url: "/x".to_string() }));
        let result = waiter.await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Transport { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_key() {
        let in_flight = InFlight::<u32>::new();
        let leader = expect_leader(in_flight.join("txt_Notes"));
        let follower = expect_follower(in_flight.join("txt_Notes"));

        drop(leader);
        assert!(in_flight.is_empty());
        assert!(follower.wait().await.is_none());
        assert!(matches!(in_flight.join("txt_Notes"), InFlightRole::Leader(_)));
    }
}
