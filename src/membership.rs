//! The membership table: authoritative peer map plus the round-robin ping
//! queue with random-insert semantics (§4.1).

use crate::gossip::GossipHeap;
use crate::member::Member;
use crate::node::Node;
use crate::status::Status;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;

pub enum AddMemberOutcome {
    Added(Member),
    NewerAlreadyPresent(Member),
}

pub enum MarkOutcome {
    Applied { previous_status: Status, member: Member },
    IgnoredDueToOlderStatus(Status),
    /// `mark` was called for a peer not in the table. Every call site in
    /// this crate checks `get(peer).is_some()` first, so this is reachable
    /// only through a caller bug; see the precondition note on `mark`.
    UnknownPeer,
}

#[derive(Debug)]
pub struct Membership {
    myself: Node,
    members: HashMap<Node, Member>,
    members_to_ping: Vec<Node>,
    ping_index: usize,
    pub gossip: GossipHeap,
}

impl Membership {
    pub fn new(myself: Node, initial_incarnation: u64, protocol_period: u64) -> Self {
        let mut members = HashMap::new();
        members.insert(myself, Member::new(myself, Status::Alive(initial_incarnation), protocol_period));
        Membership {
            myself,
            members,
            members_to_ping: Vec::new(),
            ping_index: 0,
            gossip: GossipHeap::new(),
        }
    }

    pub fn myself(&self) -> &Node {
        &self.myself
    }

    pub fn get(&self, peer: &Node) -> Option<&Member> {
        self.members.get(peer)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn all_members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Find an existing record sharing `peer`'s endpoint but a different
    /// (or absent) UID -- a UID-less alias waiting to be reconciled.
    fn find_uid_less_alias(&self, peer: &Node) -> Option<Node> {
        self.members
            .keys()
            .find(|candidate| candidate.same_endpoint(peer) && **candidate != *peer)
            .copied()
    }

    fn refresh_gossip_payloads(&mut self) {
        self.gossip.reset_payloads(self.members.values());
    }

    /// Install `status` for `peer` stamped at `protocol_period`, inserting it
    /// into the round-robin ping queue at a uniformly random index if it's a
    /// newly-seen non-self peer.
    pub fn add_member(&mut self, peer: Node, status: Status, protocol_period: u64, rng: &mut StdRng) -> AddMemberOutcome {
        if let Some(existing) = self.members.get(&peer) {
            if existing.status.supersedes(&status) {
                return AddMemberOutcome::NewerAlreadyPresent(existing.clone());
            }
        }

        if let Some(alias) = self.find_uid_less_alias(&peer) {
            self.members.remove(&alias);
            self.members_to_ping.retain(|p| *p != alias);
        }

        let member = Member::new(peer, status, protocol_period);
        let is_new_non_self = peer != self.myself && !self.members_to_ping.contains(&peer);
        self.members.insert(peer, member.clone());

        if is_new_non_self {
            let index = rng.gen_range(0..=self.members_to_ping.len());
            self.members_to_ping.insert(index, peer);
            if index <= self.ping_index {
                self.ping_index += 1;
            }
        }

        self.refresh_gossip_payloads();
        AddMemberOutcome::Added(member)
    }

    /// Merge `incoming_by` into `previous_by`, capped at
    /// `max_independent_suspicions`. Iterates `incoming_by` in sorted node
    /// order so the result is deterministic.
    pub fn merge_suspicions(
        incoming_by: &std::collections::BTreeSet<Node>,
        previous_by: &std::collections::BTreeSet<Node>,
        max_independent_suspicions: u32,
    ) -> std::collections::BTreeSet<Node> {
        let mut merged = previous_by.clone();
        for node in incoming_by.iter() {
            if merged.len() >= max_independent_suspicions as usize {
                break;
            }
            merged.insert(*node);
        }
        merged
    }

    /// Apply an incoming status observation for `peer`, per §4.1. The caller
    /// (see [`crate::instance::Instance::mark_peer`]) has already computed
    /// the "effective incoming status": suspicion merge against the current
    /// record, unreachable-to-dead promotion, and -- crucially -- the
    /// `protocol_period_stamp`/`suspicion_started_at` to install, which for a
    /// same-incarnation suspicion merge must be the *existing* record's
    /// values rather than fresh ones. `mark` itself just installs whatever it
    /// is given, after checking `supersedes`.
    ///
    /// Precondition: `peer` is already a known member. Every call site in
    /// this crate checks `get(peer).is_some()` first and emits a dedicated
    /// `unknownMember`/`ignored` directive otherwise (see §4.5); `mark` never
    /// needs to invent a "previous status" for a peer it has never seen. A
    /// caller that violates the precondition in release builds gets a
    /// logged no-op rather than a crash: this `Instance`'s methods are
    /// documented as infallible once constructed, and a bookkeeping slip in
    /// one event handler should not bring the whole detector down.
    pub fn mark(&mut self, peer: Node, effective_status: Status, suspicion_started_at: Option<u64>, protocol_period_stamp: u64) -> MarkOutcome {
        let current = match self.members.get(&peer).cloned() {
            Some(current) => current,
            None => {
                debug_assert!(false, "mark() called for unknown peer {peer}; caller must check get() first");
                log::error!("mark() called for unknown peer {peer}; ignoring");
                return MarkOutcome::UnknownPeer;
            }
        };

        if current.status.supersedes(&effective_status) {
            return MarkOutcome::IgnoredDueToOlderStatus(current.status);
        }

        let member = if effective_status.is_suspect() {
            Member::suspect(peer, effective_status.clone(), protocol_period_stamp, suspicion_started_at.unwrap_or(0))
        } else {
            Member::new(peer, effective_status.clone(), protocol_period_stamp)
        };
        let previous_status = current.status.clone();
        self.install(peer, member.clone());
        MarkOutcome::Applied { previous_status, member }
    }

    /// Directly overwrite our own record, bypassing `supersedes` and the
    /// suspect/non-suspect constructor split `mark` enforces. Used for
    /// self-refutation and self-dead fold-in (§4.6), where the new status is
    /// decided unconditionally by the caller rather than compared against
    /// the existing one.
    ///
    /// Deliberately does not go through `install`/`refresh_gossip_payloads`:
    /// per §4.6 a self-status change is disseminated as a single fresh
    /// gossip entry for `myself` (`addToGossip`), not a reset of every
    /// member's dissemination count (`resetGossipPayloads`). `myself` is
    /// never in `members_to_ping`, so there is no ping-queue bookkeeping to
    /// redo here either.
    pub fn set_self_status(&mut self, status: Status, protocol_period: u64) -> Member {
        let member = Member::new(self.myself, status, protocol_period);
        self.members.insert(self.myself, member.clone());
        self.gossip.add(member.clone());
        member
    }

    fn install(&mut self, peer: Node, member: Member) {
        let became_dead = member.status.is_dead();
        self.members.insert(peer, member);
        if became_dead {
            self.remove_from_members_to_ping(&peer);
        }
        self.refresh_gossip_payloads();
    }

    /// Returns the next ping target in round-robin order, advancing the
    /// cursor. No reshuffle on wrap (see open questions in the spec this
    /// module implements): random-insert-on-add already spreads the order.
    pub fn next_member_to_ping(&mut self) -> Option<Node> {
        if self.members_to_ping.is_empty() {
            return None;
        }
        let target = self.members_to_ping[self.ping_index];
        self.ping_index = (self.ping_index + 1) % self.members_to_ping.len();
        Some(target)
    }

    /// Up to `k` members, neither `target` nor `myself`, whose status is
    /// alive or suspect, chosen uniformly at random without replacement.
    pub fn members_to_ping_request(&self, target: &Node, k: usize, rng: &mut StdRng) -> Vec<Node> {
        let mut candidates: Vec<Node> = self
            .members
            .values()
            .filter(|m| m.peer != *target && m.peer != self.myself)
            .filter(|m| matches!(m.status, Status::Alive(_) | Status::Suspect(..)))
            .map(|m| m.peer)
            .collect();
        candidates.sort();
        let k = k.min(candidates.len());
        let mut chosen = Vec::with_capacity(k);
        for _ in 0..k {
            let idx = rng.gen_range(0..candidates.len());
            chosen.push(candidates.swap_remove(idx));
        }
        chosen
    }

    pub fn remove_from_members_to_ping(&mut self, peer: &Node) {
        if let Some(index) = self.members_to_ping.iter().position(|p| p.same_endpoint(peer)) {
            self.members_to_ping.remove(index);
            if index < self.ping_index {
                self.ping_index -= 1;
            }
            if self.ping_index >= self.members_to_ping.len() {
                self.ping_index = 0;
            }
        }
    }

    #[cfg(test)]
    pub fn ping_index(&self) -> usize {
        self.ping_index
    }

    #[cfg(test)]
    pub fn members_to_ping(&self) -> &[Node] {
        &self.members_to_ping
    }
}
