//! Per-key request coalescing.
//!
//! The dispatcher claims every [`CacheKey`] before it spawns a task. The first
//! claim for a key makes its task the leader: it takes a worker slot, runs the
//! lookup and publishes the verdict. Every later claim is a follower that awaits
//! the published verdict without holding a slot. Slots live for the whole run, so
//! a key is looked up at most once per run even when its verdict is not cacheable.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::CacheKey;
use crate::resolver::Verdict;

/// Outcome of claiming a key.
#[derive(Debug)]
pub(crate) enum Claim {
    /// First claim; publishes the verdict when its lookup finishes.
    Leader(watch::Sender<Option<Verdict>>),
    /// Later claim; reads the leader's verdict.
    Follower(watch::Receiver<Option<Verdict>>),
}

impl Claim {
    pub(crate) fn is_leader(&self) -> bool {
        matches!(self, Self::Leader(_))
    }
}

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    slots: DashMap<CacheKey, watch::Receiver<Option<Verdict>>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claims `key`. Synchronous, so dispatch order decides the leader.
    pub(crate) fn claim(&self, key: &CacheKey) -> Claim {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(slot) => Claim::Follower(slot.get().clone()),
            Entry::Vacant(slot) => {
                let (publish, verdict) = watch::channel(None);
                slot.insert(verdict);
                Claim::Leader(publish)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Publishes a leader's verdict to every current and later follower.
pub(crate) fn publish(leader: &watch::Sender<Option<Verdict>>, verdict: &Verdict) {
    leader.send_replace(Some(verdict.clone()));
}

/// Waits for the leader's verdict.
///
/// Returns `None` when the leader went away without publishing (aborted or
/// panicked); the caller then runs the lookup itself.
pub(crate) async fn follow(mut leader: watch::Receiver<Option<Verdict>>) -> Option<Verdict> {
    leader
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|verdict| verdict.clone())
}
