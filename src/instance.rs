//! The Instance: a pure `(state, event) -> (state', directives)` reducer.
//! This is the bulk of the crate -- see module docs on [`crate`] for the
//! overall shape. No method here performs I/O, sleeps, or spawns anything;
//! every externally visible effect is returned as a [`Directive`].

use crate::clock::Clock;
use crate::config::Config;
use crate::directive::{
    ConfirmDeadOutcome, Directive, GossipApplyOutcome, MembershipChange, PingRequestCandidate,
    PingRequestResponseOutcome,
};
use crate::error::ConfigError;
use crate::events::{Event, PingRequestResponse, PingResponse};
use crate::lhm::{Lhm, LhmEvent};
use crate::member::Member;
use crate::membership::{AddMemberOutcome, MarkOutcome, Membership};
use crate::node::Node;
use crate::status::{Incarnation, Status};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct Instance {
    config: Config,
    clock: Clock,
    rng: StdRng,
    myself: Node,
    incarnation: Incarnation,
    protocol_period: u64,
    sequence_number: u64,
    lhm: Lhm,
    membership: Membership,
}

impl Instance {
    /// Build a fresh Instance. Validates `config` (§4.8); once this returns
    /// `Ok`, every subsequent method on `Instance` is infallible.
    pub fn new(config: Config, myself: Node, clock: Clock) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.rng_seed);
        let lhm = Lhm::new(config.lifeguard.max_local_health_multiplier);
        let membership = Membership::new(myself, 0, 0);
        let mut instance = Instance {
            config,
            clock,
            rng,
            myself,
            incarnation: 0,
            protocol_period: 0,
            sequence_number: 0,
            lhm,
            membership,
        };
        let self_member = instance.self_member();
        instance.membership.gossip.add(self_member);
        Ok(instance)
    }

    pub fn myself(&self) -> Node {
        self.myself
    }

    pub fn incarnation(&self) -> Incarnation {
        self.incarnation
    }

    pub fn protocol_period(&self) -> u64 {
        self.protocol_period
    }

    pub fn local_health_multiplier(&self) -> u32 {
        self.lhm.value()
    }

    pub fn member(&self, peer: &Node) -> Option<&Member> {
        self.membership.get(peer)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.membership.all_members()
    }

    /// Directly install a known peer, bypassing gossip. Intended for the
    /// shell to seed bootstrap addresses before the protocol loop starts.
    pub fn add_member(&mut self, peer: Node, status: Status) -> Directive {
        match self.membership.add_member(peer, status, self.protocol_period, &mut self.rng) {
            AddMemberOutcome::Added(member) => {
                info!("discovered {}", member);
                Directive::MembershipChanged(MembershipChange { previous_status: None, member })
            }
            AddMemberOutcome::NewerAlreadyPresent(_) => Directive::Ignore,
        }
    }

    /// Dispatch a single event. Equivalent to calling the matching `on_*`
    /// method directly; provided for shells that want one entry point.
    pub fn handle(&mut self, event: Event) -> Vec<Directive> {
        match event {
            Event::PeriodicPingTick => self.on_periodic_ping_tick(),
            Event::Ping { origin, payload, sequence_number } => self.on_ping(origin, payload, sequence_number),
            Event::PingRequest { target, reply_to, payload } => self.on_ping_request(target, reply_to, payload),
            Event::PingResponse { response, ping_request_origin } => self.on_ping_response(response, ping_request_origin),
            Event::EveryPingRequestResponse { response } => self.on_every_ping_request_response(response),
            Event::PingRequestResponse { response, pinged_member } => self.on_ping_request_response(response, pinged_member),
            Event::ConfirmDead { peer } => {
                vec![match self.confirm_dead(peer) {
                    ConfirmDeadOutcome::Applied(change) => Directive::MembershipChanged(change),
                    ConfirmDeadOutcome::Ignored => Directive::Ignore,
                }]
            }
        }
    }

    // ---- §4.5 event handlers -------------------------------------------

    pub fn on_periodic_ping_tick(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();

        let expired = self.expired_suspicions();
        for (peer, incarnation, suspected_by_count) in expired {
            let next_status = if self.config.extension_unreachability.is_enabled() {
                Status::Unreachable(incarnation)
            } else {
                Status::Dead
            };
            if let MarkOutcome::Applied { previous_status, member } = self.mark_peer(peer, next_status) {
                info!(
                    "{} suspicion timed out after {} independent suspicion(s): {} -> {}",
                    peer, suspected_by_count, previous_status, member.status
                );
                directives.push(Directive::MembershipChanged(MembershipChange {
                    previous_status: Some(previous_status),
                    member,
                }));
            }
        }

        if let Some(target) = self.membership.next_member_to_ping() {
            debug!("picking {} as next round-robin ping target", target);
            let sequence_number = self.next_sequence_number();
            directives.push(Directive::SendPing {
                target,
                timeout: self.lhm.dynamic_ping_timeout(self.config.ping_timeout),
                sequence_number,
                on_behalf_of: None,
            });
        }

        self.protocol_period += 1;
        directives
    }

    pub fn on_ping(&mut self, origin: Node, payload: Vec<Member>, sequence_number: u64) -> Vec<Directive> {
        let mut directives = self.fold_gossip_payload(payload);
        let target_member = self.membership.get(&origin).cloned();
        let gossip = self.make_gossip_payload(target_member.as_ref());
        directives.push(Directive::SendAck {
            to: origin,
            incarnation: self.incarnation,
            gossip,
            acknowledging: sequence_number,
        });
        directives
    }

    pub fn on_ping_request(&mut self, target: Node, reply_to: Node, payload: Vec<Member>) -> Vec<Directive> {
        let mut directives = self.fold_gossip_payload(payload);

        if target == self.myself {
            directives.push(Directive::Ignore);
            return directives;
        }

        if self.membership.get(&target).is_none() {
            self.membership.add_member(target, Status::Alive(0), self.protocol_period, &mut self.rng);
        }

        let sequence_number = self.next_sequence_number();
        directives.push(Directive::SendPing {
            target,
            timeout: self.config.indirect_ping_timeout(),
            sequence_number,
            on_behalf_of: Some(reply_to),
        });
        directives
    }

    pub fn on_ping_response(&mut self, response: PingResponse, ping_request_origin: Option<Node>) -> Vec<Directive> {
        match response {
            PingResponse::Ack { target, incarnation, gossip, sequence_number } => {
                let mut directives = self.fold_gossip_payload(gossip.clone());
                if self.membership.get(&target).is_some() {
                    if let MarkOutcome::Applied { previous_status, member } = self.mark_peer(target, Status::Alive(incarnation)) {
                        directives.push(Directive::MembershipChanged(MembershipChange {
                            previous_status: Some(previous_status),
                            member,
                        }));
                    }
                }
                if let Some(origin) = ping_request_origin {
                    directives.push(Directive::SendAck { to: origin, incarnation, gossip, acknowledging: sequence_number });
                } else {
                    self.lhm.adjust(LhmEvent::SuccessfulProbe);
                }
                directives
            }
            PingResponse::Nack { .. } => {
                // LHM adjustment for missed nacks happens in
                // on_every_ping_request_response; a direct nack carries no
                // state change here (deliberate no-op, see spec §9 open
                // questions).
                Vec::new()
            }
            PingResponse::Timeout { target, sequence_number } => {
                if let Some(origin) = ping_request_origin {
                    return vec![Directive::SendNack { to: origin, acknowledging: sequence_number, target }];
                }
                self.handle_direct_probe_timeout(target)
            }
        }
    }

    fn handle_direct_probe_timeout(&mut self, target: Node) -> Vec<Directive> {
        let incarnation = match self.membership.get(&target) {
            Some(m) if !m.status.is_dead() => m.status.incarnation().unwrap_or(0),
            _ => return Vec::new(),
        };

        let mut directives = Vec::new();
        let mut suspected_by = BTreeSet::new();
        suspected_by.insert(self.myself);
        if let MarkOutcome::Applied { previous_status, member } = self.mark_peer(target, Status::Suspect(incarnation, suspected_by)) {
            info!("direct probe to {} timed out: {} -> {}", target, previous_status, member.status);
            directives.push(Directive::MembershipChanged(MembershipChange {
                previous_status: Some(previous_status),
                member,
            }));
        }
        self.lhm.adjust(LhmEvent::FailedProbe);
        directives.extend(self.prepare_ping_requests(target));
        directives
    }

    /// §4.5.1. Pick indirect-probe candidates for `target` and ask the shell
    /// to query them. Assumes `target` has already been marked suspect by
    /// the caller ([`Self::handle_direct_probe_timeout`]); if no candidates
    /// exist there is nothing further to do (the direct mark already stands).
    fn prepare_ping_requests(&mut self, target: Node) -> Vec<Directive> {
        let candidates = self.membership.members_to_ping_request(&target, self.config.indirect_probe_count, &mut self.rng);
        if candidates.is_empty() {
            debug!("no candidates available for indirect probe of {}", target);
            return Vec::new();
        }

        let target_member = self.membership.get(&target).cloned();
        let request_candidates = candidates
            .into_iter()
            .map(|candidate| {
                let gossip = self.make_gossip_payload(target_member.as_ref());
                let sequence_number = self.next_sequence_number();
                PingRequestCandidate { candidate, gossip, sequence_number }
            })
            .collect();

        vec![Directive::SendPingRequests { target, candidates: request_candidates }]
    }

    pub fn on_ping_request_response(&mut self, response: PingRequestResponse, pinged_member: Node) -> Vec<Directive> {
        let existing_status = match self.membership.get(&pinged_member) {
            Some(m) => m.status.clone(),
            None => return vec![Directive::PingRequestResponse(PingRequestResponseOutcome::UnknownMember)],
        };

        match response {
            PingRequestResponse::Ack { incarnation, gossip } => {
                let mut directives = self.fold_gossip_payload(gossip);
                match self.mark_peer(pinged_member, Status::Alive(incarnation)) {
                    MarkOutcome::Applied { previous_status, .. } => {
                        directives.push(Directive::PingRequestResponse(PingRequestResponseOutcome::Alive(Some(previous_status))));
                    }
                    MarkOutcome::IgnoredDueToOlderStatus(_) | MarkOutcome::UnknownPeer => {
                        directives.push(Directive::PingRequestResponse(PingRequestResponseOutcome::IgnoredDueToOlderStatus));
                    }
                }
                directives
            }
            PingRequestResponse::Nack => vec![Directive::PingRequestResponse(PingRequestResponseOutcome::NackReceived)],
            PingRequestResponse::Timeout => match existing_status {
                Status::Alive(inc) | Status::Suspect(inc, _) => {
                    let mut suspected_by = BTreeSet::new();
                    suspected_by.insert(self.myself);
                    match self.mark_peer(pinged_member, Status::Suspect(inc, suspected_by)) {
                        MarkOutcome::Applied { .. } => vec![Directive::PingRequestResponse(PingRequestResponseOutcome::NewlySuspect)],
                        MarkOutcome::IgnoredDueToOlderStatus(_) | MarkOutcome::UnknownPeer => {
                            vec![Directive::PingRequestResponse(PingRequestResponseOutcome::IgnoredDueToOlderStatus)]
                        }
                    }
                }
                Status::Unreachable(_) => vec![Directive::PingRequestResponse(PingRequestResponseOutcome::AlreadyUnreachable)],
                Status::Dead => vec![Directive::PingRequestResponse(PingRequestResponseOutcome::AlreadyDead)],
            },
        }
    }

    pub fn on_every_ping_request_response(&mut self, response: PingRequestResponse) -> Vec<Directive> {
        if matches!(response, PingRequestResponse::Timeout) {
            self.lhm.adjust(LhmEvent::ProbeWithMissedNack);
        }
        Vec::new()
    }

    pub fn confirm_dead(&mut self, peer: Node) -> ConfirmDeadOutcome {
        match self.membership.get(&peer) {
            None => ConfirmDeadOutcome::Ignored,
            Some(m) if m.status.is_dead() => ConfirmDeadOutcome::Ignored,
            Some(_) => match self.mark_peer(peer, Status::Dead) {
                MarkOutcome::Applied { previous_status, member } => {
                    info!("{} confirmed dead by external command", peer);
                    ConfirmDeadOutcome::Applied(MembershipChange { previous_status: Some(previous_status), member })
                }
                MarkOutcome::IgnoredDueToOlderStatus(_) | MarkOutcome::UnknownPeer => ConfirmDeadOutcome::Ignored,
            },
        }
    }

    // ---- §4.6 gossip fold-in ---------------------------------------------

    fn fold_gossip_payload(&mut self, payload: Vec<Member>) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(payload.len());
        for record in payload {
            let directive = if record.peer == self.myself {
                self.fold_self_record(record)
            } else {
                self.fold_other_record(record).map(|outcome| Directive::GossipProcessed(outcome))
            };
            if let Some(d) = directive {
                directives.push(d);
            }
        }
        directives
    }

    fn fold_self_record(&mut self, record: Member) -> Option<Directive> {
        match record.status {
            Status::Alive(_) => None,
            Status::Suspect(inc, _) => self.maybe_refute_self(inc),
            Status::Unreachable(inc) => {
                if self.config.extension_unreachability.is_enabled() {
                    self.maybe_refute_self(inc)
                } else {
                    None
                }
            }
            Status::Dead => {
                let previous_status = self.self_member().status;
                let member = self.membership.set_self_status(Status::Dead, self.protocol_period);
                info!("received gossip declaring {} dead; self status is terminal", self.myself);
                Some(Directive::GossipProcessed(GossipApplyOutcome { previous_status: Some(previous_status), member }))
            }
        }
    }

    /// Shared structure for self-suspicion and (when enabled)
    /// self-unreachability, per §4.6: refute at equal incarnation, log and
    /// ignore at a higher one (can't happen honestly, since we own our own
    /// incarnation counter), silently ignore a stale lower one.
    fn maybe_refute_self(&mut self, incoming_incarnation: Incarnation) -> Option<Directive> {
        match incoming_incarnation.cmp(&self.incarnation) {
            std::cmp::Ordering::Equal => {
                let previous_status = self.self_member().status;
                self.lhm.adjust(LhmEvent::RefutingSuspectAboutSelf);
                let member = self.refute_self();
                Some(Directive::GossipProcessed(GossipApplyOutcome { previous_status: Some(previous_status), member }))
            }
            std::cmp::Ordering::Greater => {
                warn!(
                    "gossip names {} suspect/unreachable at incarnation {} ahead of our own {}; suspicious but harmless, ignoring",
                    self.myself, incoming_incarnation, self.incarnation
                );
                None
            }
            std::cmp::Ordering::Less => None,
        }
    }

    fn refute_self(&mut self) -> Member {
        self.incarnation += 1;
        let member = self.membership.set_self_status(Status::Alive(self.incarnation), self.protocol_period);
        info!("refuting suspicion about {}: incarnation bumped to {}", self.myself, self.incarnation);
        member
    }

    fn fold_other_record(&mut self, record: Member) -> Option<GossipApplyOutcome> {
        if self.membership.get(&record.peer).is_none() {
            if !record.peer.has_uid() {
                return None;
            }
            return match self.membership.add_member(record.peer, record.status, self.protocol_period, &mut self.rng) {
                AddMemberOutcome::Added(member) => {
                    info!("discovered {} via gossip", member);
                    Some(GossipApplyOutcome { previous_status: None, member })
                }
                AddMemberOutcome::NewerAlreadyPresent(_) => None,
            };
        }

        match self.mark_peer(record.peer, record.status) {
            MarkOutcome::Applied { previous_status, member } => Some(GossipApplyOutcome { previous_status: Some(previous_status), member }),
            MarkOutcome::IgnoredDueToOlderStatus(_) | MarkOutcome::UnknownPeer => None,
        }
    }

    // ---- shared helpers ----------------------------------------------

    fn self_member(&self) -> Member {
        self.membership.get(&self.myself).cloned().expect("myself is always a member")
    }

    fn next_sequence_number(&mut self) -> u64 {
        self.sequence_number += 1;
        self.sequence_number
    }

    /// Compute the effective incoming status for `peer` per §4.1's `mark`
    /// bullet (suspicion merge at matching incarnation, unreachable-to-dead
    /// promotion), then install it. Precondition: `peer` is already known.
    fn mark_peer(&mut self, peer: Node, incoming: Status) -> MarkOutcome {
        let existing = self.membership.get(&peer).cloned();
        let (effective_status, suspicion_started_at, protocol_period_stamp) = match incoming {
            Status::Suspect(inc, new_by) => match &existing {
                Some(Member { status: Status::Suspect(existing_inc, old_by), protocol_period_stamp, suspicion_started_at, .. }) if *existing_inc == inc => {
                    let merged = Membership::merge_suspicions(&new_by, old_by, self.config.lifeguard.max_independent_suspicions);
                    (Status::Suspect(inc, merged), *suspicion_started_at, *protocol_period_stamp)
                }
                _ => (Status::Suspect(inc, new_by), Some(self.clock.now_nanos()), self.protocol_period),
            },
            Status::Unreachable(inc) if !self.config.extension_unreachability.is_enabled() => (Status::Dead, None, self.protocol_period),
            other => (other, None, self.protocol_period),
        };
        self.membership.mark(peer, effective_status, suspicion_started_at, protocol_period_stamp)
    }

    fn make_gossip_payload(&mut self, target_member: Option<&Member>) -> Vec<Member> {
        let cluster_size = self.membership.len();
        let max_messages = self.config.gossip.max_messages_per_gossip;
        let needs_more = self.config.gossip.needs_to_be_gossiped_more_times.clone();
        let payload = self.membership.gossip.make_payload(target_member, max_messages, cluster_size, &needs_more);
        if payload.is_empty() {
            vec![self.self_member()]
        } else {
            payload
        }
    }

    /// Members currently suspect whose suspicion timer has expired, with
    /// enough context to apply the transition. Collected up front so the
    /// mutation loop in `on_periodic_ping_tick` doesn't alias `membership`.
    fn expired_suspicions(&self) -> Vec<(Node, Incarnation, usize)> {
        let now = self.clock.now_nanos();
        self.membership
            .all_members()
            .filter_map(|m| match &m.status {
                Status::Suspect(inc, by) => {
                    let timeout = crate::suspicion::suspicion_timeout(
                        self.config.lifeguard.suspicion_timeout_min,
                        self.config.lifeguard.suspicion_timeout_max,
                        by.len(),
                        self.config.lifeguard.max_independent_suspicions,
                    );
                    let started_at = m.suspicion_started_at.unwrap_or(0);
                    if crate::suspicion::has_timed_out(started_at, now, timeout) {
                        Some((m.peer, *inc, by.len()))
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect()
    }
}
