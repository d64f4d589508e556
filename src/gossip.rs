//! Infection-style gossip dissemination: a min-heap of member snapshots
//! ordered by how many times each has already been gossiped, so the least-
//! disseminated rumors go out first.

use crate::config::{GossipEntryView, NeedsToBeGossipedMoreTimes};
use crate::member::Member;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
pub struct GossipEntry {
    pub member: Member,
    pub times_gossiped: u32,
}

impl GossipEntry {
    fn fresh(member: Member) -> Self {
        GossipEntry { member, times_gossiped: 0 }
    }

    fn view(&self) -> GossipEntryView {
        GossipEntryView { times_gossiped: self.times_gossiped }
    }
}

impl PartialEq for GossipEntry {
    fn eq(&self, other: &Self) -> bool {
        self.times_gossiped == other.times_gossiped
    }
}
impl Eq for GossipEntry {}

// `BinaryHeap` is a max-heap; reverse the comparison so the entry with the
// fewest gossip rounds pops first.
impl PartialOrd for GossipEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for GossipEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.times_gossiped.cmp(&self.times_gossiped)
    }
}

#[derive(Debug, Default)]
pub struct GossipHeap {
    heap: BinaryHeap<GossipEntry>,
}

impl GossipHeap {
    pub fn new() -> Self {
        GossipHeap { heap: BinaryHeap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove any existing entry for `member`'s endpoint, then insert a
    /// fresh one with `times_gossiped = 0`.
    pub fn add(&mut self, member: Member) {
        self.remove_endpoint(&member.peer);
        self.heap.push(GossipEntry::fresh(member));
    }

    fn remove_endpoint(&mut self, peer: &crate::node::Node) {
        if self.heap.iter().any(|e| e.member.peer.same_endpoint(peer)) {
            let remaining: Vec<_> = self.heap.drain().filter(|e| !e.member.peer.same_endpoint(peer)).collect();
            self.heap = remaining.into_iter().collect();
        }
    }

    /// Re-add every member in `members` as a fresh entry. Used after any
    /// membership-table mutation so new joiners eventually see the full view
    /// even in a quiescent cluster.
    pub fn reset_payloads<'a>(&mut self, members: impl Iterator<Item = &'a Member>) {
        self.heap.clear();
        for member in members {
            self.heap.push(GossipEntry::fresh(member.clone()));
        }
    }

    /// Build an outgoing gossip payload.
    ///
    /// If `target` is known and currently suspect, its own record is
    /// prepended first (the Lifeguard buddy system: a suspect must always
    /// hear about its own suspicion so it can refute it). Then up to
    /// `max_messages` entries are drained from the heap; each either goes
    /// back in (if it still needs more dissemination rounds) or is dropped.
    ///
    /// Returns an empty payload when there is nothing to say; the caller
    /// (the Instance) is responsible for substituting `[myself]` in that
    /// case, since this heap has no notion of "myself".
    pub fn make_payload(
        &mut self,
        target_member: Option<&Member>,
        max_messages: usize,
        cluster_size: usize,
        needs_more: &NeedsToBeGossipedMoreTimes,
    ) -> Vec<Member> {
        let mut payload = Vec::new();
        let buddy_endpoint = target_member.filter(|m| m.status.is_suspect()).map(|m| {
            payload.push(m.clone());
            m.peer
        });

        if self.heap.is_empty() && payload.is_empty() {
            return payload;
        }

        let mut drained = Vec::with_capacity(max_messages.min(self.heap.len()));
        while drained.len() < max_messages {
            match self.heap.pop() {
                Some(entry) => drained.push(entry),
                None => break,
            }
        }

        for mut entry in drained {
            if let Some(buddy) = buddy_endpoint {
                if entry.member.peer.same_endpoint(&buddy) {
                    continue;
                }
            }
            payload.push(entry.member.clone());
            entry.times_gossiped += 1;
            if needs_more(entry.view(), cluster_size) {
                self.heap.push(entry);
            }
        }

        payload
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.heap.len()
    }
}
