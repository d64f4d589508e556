//! Concrete end-to-end scenarios exercising `Instance` through its public
//! event-handling surface.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use swim_lifeguard::{
    Clock, Config, ConfigError, Directive, GossipEntryView, Instance, Member, Node, PingResponse,
    Status, UnreachabilityExtension,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn node(port: u16) -> Node {
    Node::new(format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap(), port as u64)
}

fn fixed_clock() -> Clock {
    Clock::new(|| 0)
}

fn virtual_clock() -> (Clock, Arc<AtomicU64>) {
    let now = Arc::new(AtomicU64::new(0));
    let reader = now.clone();
    (Clock::new(move || reader.load(Ordering::SeqCst)), now)
}

#[test]
fn fresh_instance_produces_no_directives_and_advances_the_protocol_period() {
    init_logging();
    let myself = node(0);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let directives = instance.on_periodic_ping_tick();
    assert!(directives.is_empty());
    assert_eq!(instance.protocol_period(), 1);
}

#[test]
fn refutation_bumps_incarnation_and_gossips_a_fresh_alive_record() {
    init_logging();
    let myself = node(9);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let suspecting = node(1);
    let origin = node(2);

    for expected_incarnation in 0..5 {
        let mut by = BTreeSet::new();
        by.insert(suspecting);
        let payload = vec![Member::suspect(myself, Status::Suspect(expected_incarnation, by), 0, 0)];
        instance.on_ping(origin, payload, 1);
    }
    assert_eq!(instance.incarnation(), 5);

    let lhm_before = instance.local_health_multiplier();
    let mut by = BTreeSet::new();
    by.insert(suspecting);
    let payload = vec![Member::suspect(myself, Status::Suspect(5, by), 0, 0)];
    let directives = instance.on_ping(origin, payload, 7);

    assert_eq!(instance.incarnation(), 6);
    assert_eq!(instance.local_health_multiplier(), lhm_before + 1);
    assert!(directives.iter().any(|d| matches!(
        d,
        Directive::GossipProcessed(outcome) if outcome.previous_status.is_some() && outcome.member.peer == myself
    )));
}

/// Self-refutation must disseminate only a fresh `myself` record
/// (`addToGossip`), not reset every other member's dissemination count
/// (`resetGossipPayloads`). A member whose entry already drained out of the
/// heap must stay drained after a self-refutation.
#[test]
fn self_refutation_does_not_reset_other_members_gossip_counters() {
    init_logging();
    let mut cfg = Config::default();
    cfg.gossip.needs_to_be_gossiped_more_times = Arc::new(|_: GossipEntryView, _: usize| false);
    let myself = node(0);
    let mut instance = Instance::new(cfg, myself, fixed_clock()).unwrap();
    let other = node(1);
    let _ = instance.add_member(other, Status::Alive(0));

    let gossip_of = |directives: &[Directive]| -> Vec<Member> {
        directives
            .iter()
            .find_map(|d| match d {
                Directive::SendAck { gossip, .. } => Some(gossip.clone()),
                _ => None,
            })
            .unwrap()
    };

    let first = instance.on_ping(node(2), vec![], 1);
    assert!(
        gossip_of(&first).iter().any(|m| m.peer == other),
        "other should be disseminated on its first round"
    );

    let mut by = BTreeSet::new();
    by.insert(node(9));
    let suspicion_about_self = vec![Member::suspect(myself, Status::Suspect(0, by), 0, 0)];
    instance.on_ping(node(3), suspicion_about_self, 2);
    assert_eq!(instance.incarnation(), 1);

    let second = gossip_of(&instance.on_ping(node(4), vec![], 3));
    assert!(
        !second.iter().any(|m| m.peer == other),
        "other's already-drained entry must not be reset by self-refutation"
    );
    assert!(
        second.iter().any(|m| m.peer == myself && m.status == Status::Alive(1)),
        "self's fresh record should be the one disseminated"
    );
}

#[test]
fn direct_probe_timeout_installs_suspicion_and_requests_indirect_probes() {
    init_logging();
    let myself = node(0);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let p = node(1);
    let helper = node(2);
    let _ = instance.add_member(p, Status::Alive(3));
    let _ = instance.add_member(helper, Status::Alive(0));

    let directives = instance.on_ping_response(PingResponse::Timeout { target: p, sequence_number: 1 }, None);

    let changed = directives
        .iter()
        .find_map(|d| match d {
            Directive::MembershipChanged(change) if change.member.peer == p => Some(change),
            _ => None,
        })
        .expect("expected a membership change for P");
    assert!(matches!(changed.member.status, Status::Suspect(3, _)));
    assert!(directives
        .iter()
        .any(|d| matches!(d, Directive::SendPingRequests { target, .. } if *target == p)));
}

#[test]
fn direct_probe_timeout_with_no_helpers_still_installs_suspicion() {
    init_logging();
    let myself = node(0);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let p = node(1);
    let _ = instance.add_member(p, Status::Alive(3));

    let directives = instance.on_ping_response(PingResponse::Timeout { target: p, sequence_number: 1 }, None);

    assert!(directives
        .iter()
        .any(|d| matches!(d, Directive::MembershipChanged(change) if change.member.peer == p)));
    assert!(!directives.iter().any(|d| matches!(d, Directive::SendPingRequests { .. })));
}

#[test]
fn indirect_success_relays_ack_to_origin_without_adjusting_lhm() {
    init_logging();
    let myself = node(0);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let origin = node(5);
    let lhm_before = instance.local_health_multiplier();

    let directives = instance.on_ping_response(
        PingResponse::Ack { target: node(1), incarnation: 7, gossip: vec![], sequence_number: 42 },
        Some(origin),
    );

    assert_eq!(instance.local_health_multiplier(), lhm_before);
    assert!(directives.iter().any(|d| matches!(
        d,
        Directive::SendAck { to, acknowledging, incarnation, .. }
            if *to == origin && *acknowledging == 42 && *incarnation == 7
    )));
}

#[test]
fn suspicion_expires_to_dead_after_the_adaptive_timeout() {
    init_logging();
    let mut cfg = Config::default();
    cfg.lifeguard.suspicion_timeout_min = Duration::from_secs(1);
    cfg.lifeguard.suspicion_timeout_max = Duration::from_secs(10);
    cfg.lifeguard.max_independent_suspicions = 3;
    cfg.extension_unreachability = UnreachabilityExtension::Disabled;

    let (clock, now) = virtual_clock();
    let myself = node(0);
    let mut instance = Instance::new(cfg, myself, clock).unwrap();
    let p = node(1);
    let _ = instance.add_member(p, Status::Alive(4));

    instance.on_ping_response(PingResponse::Timeout { target: p, sequence_number: 1 }, None);
    assert!(matches!(instance.member(&p).unwrap().status, Status::Suspect(4, _)));

    now.store(11_000_000_000, Ordering::SeqCst);
    let directives = instance.on_periodic_ping_tick();

    let changed = directives
        .iter()
        .find_map(|d| match d {
            Directive::MembershipChanged(change) if change.member.peer == p => Some(change),
            _ => None,
        })
        .expect("expected P to transition to dead");
    assert!(matches!(changed.previous_status, Some(Status::Suspect(..))));
    assert!(changed.member.status.is_dead());
}

#[test]
fn uid_less_alias_is_replaced_by_gossip_introducing_a_uid() {
    init_logging();
    let myself = node(0);
    let mut instance = Instance::new(Config::default(), myself, fixed_clock()).unwrap();
    let endpoint: SocketAddr = "127.0.0.1:50".parse().unwrap();
    let bootstrap_node = Node::bootstrap(endpoint);
    let _ = instance.add_member(bootstrap_node, Status::Alive(0));

    let named = Node::new(endpoint, 99);
    let payload = vec![Member::new(named, Status::Alive(2), 0)];
    let directives = instance.on_ping(node(7), payload, 1);

    assert!(instance.member(&bootstrap_node).is_none());
    assert_eq!(instance.member(&named).unwrap().status, Status::Alive(2));
    assert!(directives.iter().any(|d| matches!(
        d,
        Directive::GossipProcessed(outcome) if outcome.member.peer == named && outcome.previous_status.is_none()
    )));
}

#[test]
fn invalid_config_is_rejected_before_touching_clock_or_rng() {
    init_logging();
    let mut cfg = Config::default();
    cfg.indirect_probe_count = 0;
    let myself = node(0);
    let err = Instance::new(cfg, myself, Clock::new(|| panic!("clock must not be read during validation"))).unwrap_err();
    assert_eq!(err, ConfigError::InvalidIndirectProbeCount);
}

#[test]
fn same_seed_yields_identical_ping_order_and_indirect_candidates() {
    init_logging();
    fn build() -> Instance {
        let mut cfg = Config::default();
        cfg.rng_seed = 1234;
        let myself = node(0);
        let mut instance = Instance::new(cfg, myself, fixed_clock()).unwrap();
        for port in 1..=6 {
            let _ = instance.add_member(node(port), Status::Alive(0));
        }
        instance
    }

    let mut a = build();
    let mut b = build();

    let mut order_a = Vec::new();
    let mut order_b = Vec::new();
    for _ in 0..6 {
        for d in a.on_periodic_ping_tick() {
            if let Directive::SendPing { target, .. } = d {
                order_a.push(target);
            }
        }
        for d in b.on_periodic_ping_tick() {
            if let Directive::SendPing { target, .. } = d {
                order_b.push(target);
            }
        }
    }
    assert_eq!(order_a, order_b);

    let timeout_a = a.on_ping_response(PingResponse::Timeout { target: node(1), sequence_number: 99 }, None);
    let timeout_b = b.on_ping_response(PingResponse::Timeout { target: node(1), sequence_number: 99 }, None);
    let candidates = |directives: &[Directive]| {
        directives.iter().find_map(|d| match d {
            Directive::SendPingRequests { candidates, .. } => {
                Some(candidates.iter().map(|c| c.candidate).collect::<Vec<_>>())
            }
            _ => None,
        })
    };
    assert_eq!(candidates(&timeout_a), candidates(&timeout_b));
}
