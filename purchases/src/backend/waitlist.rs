//! Per-key waitlists for coalesced requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

/// Whether a caller has to start the work for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackStatus {
    /// No request was in flight; the caller starts it.
    FirstCallback,
    /// The caller joined a request already in flight.
    AddedToExistingInFlightList,
}

/// Callers waiting on in-flight requests, grouped by request key.
///
/// While a key has waiters no second request for it is started. Completing
/// the key removes all of its waiters at once and hands each the same value.
pub(crate) struct CallbackWaitlist<T> {
    name: &'static str,
    waiting: Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
}

impl<T: Clone> CallbackWaitlist<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a waiter for `key`.
    pub(crate) fn add(&self, key: &str) -> (CallbackStatus, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        let mut waiting = self.lock();
        let status = match waiting.get_mut(key) {
            Some(senders) => {
                senders.push(sender);
                debug!(waitlist = self.name, key, waiters = senders.len(), "Joining in-flight request");
                CallbackStatus::AddedToExistingInFlightList
            }
            None => {
                waiting.insert(key.to_owned(), vec![sender]);
                CallbackStatus::FirstCallback
            }
        };
        (status, receiver)
    }

    /// Hands `value` to every waiter of `key` and forgets the key.
    ///
    /// Returns the number of waiters that were notified.
    pub(crate) fn complete(&self, key: &str, value: T) -> usize {
        let senders = self.lock().remove(key).unwrap_or_default();
        let count = senders.len();
        for sender in senders {
            // A waiter whose caller went away is simply skipped.
            let _ = sender.send(value.clone());
        }
        count
    }

    /// Drops every waiter of `key` without a value.
    pub(crate) fn abandon(&self, key: &str) {
        if let Some(senders) = self.lock().remove(key) {
            debug!(waitlist = self.name, key, waiters = senders.len(), "Abandoning waiters");
        }
    }

    /// Number of keys with a request in flight.
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<oneshot::Sender<T>>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the task doing the work for a key.
///
/// If the task ends without completing (it was aborted or panicked) the
/// waiters are dropped, and each observes a closed channel.
pub(crate) struct LeaderGuard<T: Clone> {
    waitlist: Arc<CallbackWaitlist<T>>,
    key: Option<String>,
}

impl<T: Clone> LeaderGuard<T> {
    pub(crate) fn new(waitlist: Arc<CallbackWaitlist<T>>, key: String) -> Self {
        Self {
            waitlist,
            key: Some(key),
        }
    }

    pub(crate) fn complete(mut self, value: T) -> usize {
        match self.key.take() {
            Some(key) => self.waitlist.complete(&key, value),
            None => 0,
        }
    }
}

impl<T: Clone> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.waitlist.abandon(&key);
        }
    }
}
