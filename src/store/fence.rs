// Request fencing: drops responses that resolve after a newer one for the same key.

use std::collections::HashMap;
use std::hash::Hash;

/// Issued when a request starts. Later requests always get larger tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
pub struct RequestFence<K> {
    next: u64,
    applied: HashMap<K, Ticket>,
}

impl<K: Eq + Hash> Default for RequestFence<K> {
    fn default() -> Self {
        Self {
            next: 0,
            applied: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> RequestFence<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Ticket {
        self.next += 1;
        Ticket(self.next)
    }

    /// Records `ticket` as applied for `key` unless a newer ticket already was.
    pub fn accept(&mut self, key: K, ticket: Ticket) -> bool {
        match self.applied.get(&key) {
            Some(latest) if *latest >= ticket => false,
            _ => {
                self.applied.insert(key, ticket);
                true
            }
        }
    }

    /// True when something newer than `ticket` has already been applied for `key`.
    pub fn is_superseded(&self, key: &K, ticket: Ticket) -> bool {
        self.applied.get(key).is_some_and(|latest| *latest > ticket)
    }
}
