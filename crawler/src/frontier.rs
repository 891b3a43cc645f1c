use std::collections::{BTreeSet, HashMap, VecDeque};

/// FIFO of URLs awaiting fetch plus the parent set of every stub that is
/// queued or in flight. A URL has at most one stub at a time; rediscovering
/// it merges parents instead of queueing it twice.
#[derive(Debug, Default)]
pub(crate) struct Frontier {
    queue: VecDeque<String>,
    pending: HashMap<String, BTreeSet<String>>,
}

impl Frontier {
    /// Queues `url` with `parents`, or merges them into the existing stub.
    /// Returns true when a new stub was queued.
    pub fn push(&mut self, url: &str, parents: BTreeSet<String>) -> bool {
        if let Some(existing) = self.pending.get_mut(url) {
            existing.extend(parents);
            return false;
        }
        self.pending.insert(url.to_string(), parents);
        self.queue.push_back(url.to_string());
        true
    }

    /// Next URL to fetch. Its stub stays pending until [`Frontier::take`].
    pub fn pop(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Completes a fetch and hands back the stub's parents. `None` means the
    /// stub was collected while the fetch was in flight.
    pub fn take(&mut self, url: &str) -> Option<BTreeSet<String>> {
        self.pending.remove(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.pending.contains_key(url)
    }

    pub fn add_parent(&mut self, url: &str, parent: &str) {
        if let Some(parents) = self.pending.get_mut(url) {
            parents.insert(parent.to_string());
        }
    }

    /// Removes `parent` from a pending stub. Returns whether the stub is now
    /// orphaned, or `None` when `url` is not pending.
    pub fn remove_parent(&mut self, url: &str, parent: &str) -> Option<bool> {
        let parents = self.pending.get_mut(url)?;
        parents.remove(parent);
        Some(parents.is_empty())
    }

    /// Forgets the stub whether it is queued or in flight.
    pub fn discard(&mut self, url: &str) {
        self.pending.remove(url);
        self.queue.retain(|u| u != url);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
