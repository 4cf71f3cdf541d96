use super::mock::{MockMac, finish_last_tx, rx, token_of};
use crate::mac::{
    CommMode, DropReason, HeadIdleReason, HeadNode, HeadNodeConfig, HeadState, TimerKind,
};
use crate::net::{AnnounceHdr, GrantHdr, Header, Node, NodeId, Packet, PacketKind, TriggerHdr};
use crate::sim::{SimTime, Simulator};

const AUV: NodeId = NodeId(0);
const HN: NodeId = NodeId(10);
const SN1: NodeId = NodeId(1);
const SN2: NodeId = NodeId(2);

fn head(cfg: HeadNodeConfig) -> (HeadNode, Simulator, MockMac) {
    let mut sim = Simulator::default();
    let mut mac = MockMac::default();
    let mut hn = HeadNode::new(HN, "hn", cfg, Some(3));
    hn.start(&mut sim, &mut mac);
    (hn, sim, mac)
}

fn fire(hn: &mut HeadNode, kind: TimerKind, sim: &mut Simulator, mac: &mut MockMac) {
    let token = token_of(hn.timers(), kind);
    hn.on_timer(kind, token, sim, mac);
}

fn probe(mac: &mut MockMac, from: NodeId, num_data: u32) -> Packet {
    mac.packet(
        from,
        HN,
        Header::Probe(AnnounceHdr {
            num_data,
            backoff_ms: 100,
        }),
    )
}

fn sn_data(mac: &mut MockMac, from: NodeId, seq: u64) -> Packet {
    let mut p = mac.data(from, seq);
    p.dst = HN;
    p
}

fn trigger(mac: &mut MockMac, dst: NodeId, max_data_wanted: u32) -> Packet {
    mac.packet(
        AUV,
        dst,
        Header::Trigger(TriggerHdr {
            t_min_ms: 0,
            t_max_ms: 1_000,
            max_data_wanted,
        }),
    )
}

fn cts(mac: &mut MockMac, responder: NodeId, max_data: u32) -> Packet {
    mac.packet(
        AUV,
        responder,
        Header::Cts(GrantHdr {
            max_data,
            responder,
        }),
    )
}

/// BEACON 发出并结束，进入等 PROBE
fn open_cycle(hn: &mut HeadNode, sim: &mut Simulator, mac: &mut MockMac) {
    fire(hn, TimerKind::BeaconStart, sim, mac);
    assert_eq!(hn.state(), HeadState::BeaconTx);
    finish_last_tx(hn, sim, mac);
    assert_eq!(hn.state(), HeadState::WaitProbes);
}

/// 交换阶段：结束发送 / 触发间隔，直到不再发 DATA
fn drain_uplink(hn: &mut HeadNode, sim: &mut Simulator, mac: &mut MockMac) {
    loop {
        match hn.state_label() {
            "uplink-data-tx" => finish_last_tx(hn, sim, mac),
            "uplink-data-spacing" => fire(hn, TimerKind::DataSpacing, sim, mac),
            _ => break,
        }
    }
}

fn with_local_data(hn: &mut HeadNode, sim: &mut Simulator, mac: &mut MockMac, n: u64) {
    for seq in 0..n {
        let p = mac.data(HN, seq);
        hn.on_app_data(p, sim, mac);
    }
}

#[test]
fn starts_idle_accepting_trigger_with_start_delay() {
    let (hn, _sim, mac) = head(HeadNodeConfig::default());
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: true
        }
    );
    assert_eq!(
        hn.timers().deadline(TimerKind::BeaconStart),
        Some(SimTime::from_secs(30))
    );
    assert_eq!(hn.last_idle(), HeadIdleReason::Startup);
    assert!(mac.sent.is_empty());
}

#[test]
fn beacon_announces_probe_window_and_cbeacon_budget() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    fire(&mut hn, TimerKind::BeaconStart, &mut sim, &mut mac);

    let b = mac.last_sent();
    assert_eq!(b.kind(), PacketKind::Beacon);
    assert_eq!(b.dst, NodeId::BROADCAST);
    let hdr = b.beacon().expect("beacon header");
    assert_eq!((hdr.t_min_ms, hdr.t_max_ms, hdr.max_cbeacon), (0, 3_000, 2));

    finish_last_tx(&mut hn, &mut sim, &mut mac);
    assert_eq!(
        hn.timers().deadline(TimerKind::ProbeWait),
        Some(SimTime::from_secs(15))
    );
}

#[test]
fn probe_wait_expiry_polls_with_requested_count() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);

    let p = probe(&mut mac, SN1, 3);
    hn.on_packet(p, &mut sim, &mut mac);
    assert_eq!(hn.cluster().probed.len(), 1);

    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    let poll = mac.last_sent();
    assert_eq!(poll.kind(), PacketKind::Poll);
    assert_eq!(poll.dst, SN1);
    assert_eq!(
        poll.grant().copied(),
        Some(GrantHdr {
            max_data: 3,
            responder: SN1
        })
    );

    finish_last_tx(&mut hn, &mut sim, &mut mac);
    assert_eq!(
        hn.state(),
        HeadState::WaitData {
            polled: SN1,
            expected: 3,
            received: 0
        }
    );
    assert!(hn.timers().is_armed(TimerKind::DataWait));
}

#[test]
fn all_data_from_polled_sensor_cancels_wait_and_sends_cbeacon() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p = probe(&mut mac, SN1, 3);
    hn.on_packet(p, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);

    for seq in 0..3 {
        let d = sn_data(&mut mac, SN1, seq);
        hn.on_packet(d, &mut sim, &mut mac);
    }

    assert!(!hn.timers().is_armed(TimerKind::DataWait));
    assert!(hn.cluster().probed.is_empty());
    assert_eq!(hn.uplink_len(), 3);
    assert_eq!(hn.uplink_origins(), vec![SN1, SN1, SN1]);
    assert_eq!(hn.state(), HeadState::CbeaconTx);
    assert_eq!(mac.last_sent().kind(), PacketKind::Cbeacon);
}

#[test]
fn probe_count_is_capped_per_node() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p = probe(&mut mac, SN1, 9);
    hn.on_packet(p, &mut sim, &mut mac);
    assert_eq!(hn.cluster().probed[0].requested, 5);
}

#[test]
fn sensors_are_polled_in_probe_arrival_order() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p2 = probe(&mut mac, SN2, 1);
    hn.on_packet(p2, &mut sim, &mut mac);
    let p1 = probe(&mut mac, SN1, 1);
    hn.on_packet(p1, &mut sim, &mut mac);

    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    assert_eq!(mac.last_sent().dst, SN2);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    let d = sn_data(&mut mac, SN2, 0);
    hn.on_packet(d, &mut sim, &mut mac);

    assert_eq!(hn.state(), HeadState::PollTx);
    assert_eq!(mac.last_sent().dst, SN1);
}

#[test]
fn duplicate_probe_is_not_enabled() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    for _ in 0..2 {
        let p = probe(&mut mac, SN1, 2);
        hn.on_packet(p, &mut sim, &mut mac);
    }
    assert_eq!(hn.cluster().probed.len(), 1);
    assert_eq!(mac.drops_of(DropReason::NotEnabled), 1);
}

#[test]
fn reaching_max_polled_nodes_polls_without_waiting() {
    let cfg = HeadNodeConfig {
        max_polled_nodes: 2,
        ..HeadNodeConfig::default()
    };
    let (mut hn, mut sim, mut mac) = head(cfg);
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p1 = probe(&mut mac, SN1, 1);
    hn.on_packet(p1, &mut sim, &mut mac);
    assert_eq!(hn.state(), HeadState::WaitProbes);
    let p2 = probe(&mut mac, SN2, 1);
    hn.on_packet(p2, &mut sim, &mut mac);

    assert!(!hn.timers().is_armed(TimerKind::ProbeWait));
    assert_eq!(hn.state(), HeadState::PollTx);
    assert_eq!(mac.last_sent().dst, SN1);
}

#[test]
fn data_wait_timeout_moves_on_to_the_next_sensor() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p1 = probe(&mut mac, SN1, 2);
    hn.on_packet(p1, &mut sim, &mut mac);
    let p2 = probe(&mut mac, SN2, 2);
    hn.on_packet(p2, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    let d = sn_data(&mut mac, SN1, 0);
    hn.on_packet(d, &mut sim, &mut mac);

    fire(&mut hn, TimerKind::DataWait, &mut sim, &mut mac);

    assert_eq!(hn.stats().data_timeouts, 1);
    assert_eq!(hn.uplink_len(), 1);
    assert_eq!(mac.last_sent().dst, SN2);
    assert_eq!(hn.cluster().probed.len(), 1);
}

#[test]
fn corrupted_data_uses_up_a_grant_slot() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p = probe(&mut mac, SN1, 2);
    hn.on_packet(p, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);

    let d0 = sn_data(&mut mac, SN1, 0);
    hn.on_packet(rx(&d0, true), &mut sim, &mut mac);
    let d1 = sn_data(&mut mac, SN1, 1);
    hn.on_packet(d1, &mut sim, &mut mac);

    assert_eq!(hn.uplink_len(), 1);
    assert_eq!(hn.stats().data_rx_corrupted, 1);
    assert_eq!(hn.state(), HeadState::CbeaconTx);
}

#[test]
fn cbeacon_budget_exhausted_returns_to_idle() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);

    for _ in 0..2 {
        fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
        assert_eq!(hn.state(), HeadState::CbeaconTx);
        finish_last_tx(&mut hn, &mut sim, &mut mac);
        assert!(hn.cluster().after_cbeacon);
    }
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);

    assert_eq!(mac.sent_of(PacketKind::Cbeacon).len(), 2);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: true
        }
    );
    assert_eq!(hn.last_idle(), HeadIdleReason::CycleComplete);
    assert_eq!(hn.cluster().cbeacon_tx, 0);
    assert_eq!(hn.timers().armed().collect::<Vec<_>>(), vec![TimerKind::BeaconStart]);
}

#[test]
fn trigger_without_pending_data_waits_retry_delay() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);

    assert_eq!(mac.drops_of(DropReason::NoPendingData), 1);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: false
        }
    );
    assert_eq!(hn.last_idle(), HeadIdleReason::TriggerNoData);
    assert_eq!(
        hn.timers().deadline(TimerKind::BeaconStart),
        Some(SimTime::from_secs(15))
    );

    let again = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(again, &mut sim, &mut mac);
    assert_eq!(mac.drops_of(DropReason::NotEnabled), 1);
}

#[test]
fn corrupted_trigger_in_idle_holds_off_the_auv() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(rx(&t, true), &mut sim, &mut mac);

    assert_eq!(hn.last_idle(), HeadIdleReason::CorruptedTrigger);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: false
        }
    );
    assert_eq!(hn.stats().trigger_rx_corrupted, 1);
}

#[test]
fn rts_cts_exchange_sends_exactly_the_granted_count() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 5);

    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);
    assert_eq!(hn.state(), HeadState::Uplink);
    assert_eq!(hn.state_label(), "uplink-backoff");
    assert!(!hn.timers().is_armed(TimerKind::BeaconStart));
    let backoff = hn
        .timers()
        .deadline(TimerKind::TriggerBackoff)
        .expect("trigger backoff");
    assert!(backoff <= SimTime::from_secs(1));

    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    let rts = mac.last_sent();
    assert_eq!(rts.kind(), PacketKind::Rts);
    assert_eq!(rts.dst, AUV);
    assert_eq!(rts.announce().map(|a| a.num_data), Some(5));

    finish_last_tx(&mut hn, &mut sim, &mut mac);
    assert_eq!(hn.state_label(), "wait-cts");
    assert!(hn.timers().is_armed(TimerKind::CtsWait));

    let c = cts(&mut mac, HN, 4);
    hn.on_packet(c, &mut sim, &mut mac);
    assert!(!hn.timers().is_armed(TimerKind::CtsWait));
    drain_uplink(&mut hn, &mut sim, &mut mac);

    let data = mac.sent_of(PacketKind::Data);
    assert_eq!(data.len(), 4);
    assert!(data.iter().all(|p| p.dst == AUV && p.src == HN));
    assert_eq!(hn.uplink_len(), 1);
    assert_eq!(hn.stats().uplinks_done, 1);
    assert_eq!(hn.last_idle(), HeadIdleReason::UplinkDone);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: false
        }
    );
    assert_eq!(hn.uplink_cycle().data_tx, 0);
}

#[test]
fn forwarded_data_is_renumbered_but_keeps_its_origin() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    open_cycle(&mut hn, &mut sim, &mut mac);
    let p = probe(&mut mac, SN1, 2);
    hn.on_packet(p, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    for seq in [7, 8] {
        let d = sn_data(&mut mac, SN1, seq);
        hn.on_packet(d, &mut sim, &mut mac);
    }
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    assert_eq!(hn.state(), HeadState::WaitProbes);

    let t = trigger(&mut mac, NodeId::BROADCAST, 10);
    hn.on_packet(t, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    let c = cts(&mut mac, HN, 10);
    hn.on_packet(c, &mut sim, &mut mac);
    drain_uplink(&mut hn, &mut sim, &mut mac);

    let hdrs = mac
        .sent_of(PacketKind::Data)
        .iter()
        .map(|p| p.data().copied().expect("data header"))
        .collect::<Vec<_>>();
    assert_eq!(hdrs.len(), 2);
    assert_eq!(hdrs[0].seq, 0);
    assert_eq!(hdrs[1].seq, 1);
    assert!(hdrs.iter().all(|d| d.origin == SN1));
}

#[test]
fn trigger_after_cbeacon_is_served_then_cluster_round_resumes() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 2);
    open_cycle(&mut hn, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::ProbeWait, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    assert!(hn.cluster().after_cbeacon);

    let t = trigger(&mut mac, NodeId::BROADCAST, 10);
    hn.on_packet(t, &mut sim, &mut mac);
    assert_eq!(hn.state(), HeadState::Uplink);
    assert!(!hn.timers().is_armed(TimerKind::ProbeWait));

    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);
    let c = cts(&mut mac, HN, 10);
    hn.on_packet(c, &mut sim, &mut mac);
    drain_uplink(&mut hn, &mut sim, &mut mac);

    assert_eq!(mac.sent_of(PacketKind::Data).len(), 2);
    assert_eq!(hn.state(), HeadState::CbeaconTx);
    assert_eq!(mac.sent_of(PacketKind::Cbeacon).len(), 2);
}

/// CBEACON 之后插入与 AUV 的交换，一直走到等待 CTS
fn interleave_until_wait_cts(hn: &mut HeadNode, sim: &mut Simulator, mac: &mut MockMac) {
    with_local_data(hn, sim, mac, 2);
    open_cycle(hn, sim, mac);
    fire(hn, TimerKind::ProbeWait, sim, mac);
    finish_last_tx(hn, sim, mac);
    assert!(hn.cluster().after_cbeacon);

    let t = trigger(mac, NodeId::BROADCAST, 10);
    hn.on_packet(t, sim, mac);
    fire(hn, TimerKind::TriggerBackoff, sim, mac);
    finish_last_tx(hn, sim, mac);
    assert_eq!(hn.state_label(), "wait-cts");
}

#[test]
fn cts_timeout_while_interleaved_goes_idle_instead_of_resuming() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    interleave_until_wait_cts(&mut hn, &mut sim, &mut mac);

    fire(&mut hn, TimerKind::CtsWait, &mut sim, &mut mac);

    assert_eq!(hn.last_idle(), HeadIdleReason::CtsTimeout);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: false
        }
    );
    assert_eq!(mac.sent_of(PacketKind::Cbeacon).len(), 1);
    assert!(!hn.cluster().after_cbeacon);
    assert!(hn.timers().is_armed(TimerKind::BeaconStart));
    assert_eq!(hn.timers().armed().count(), 1);
}

#[test]
fn corrupted_cts_while_interleaved_goes_idle_instead_of_resuming() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    interleave_until_wait_cts(&mut hn, &mut sim, &mut mac);

    let c = cts(&mut mac, HN, 10);
    hn.on_packet(rx(&c, true), &mut sim, &mut mac);

    assert_eq!(hn.last_idle(), HeadIdleReason::CorruptedCts);
    assert!(matches!(hn.state(), HeadState::Idle { .. }));
    assert_eq!(mac.sent_of(PacketKind::Cbeacon).len(), 1);
    assert!(mac.sent_of(PacketKind::Data).is_empty());
    assert_eq!(hn.uplink_len(), 2);
}

#[test]
fn trigger_during_beacon_phase_is_not_enabled() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 1);
    open_cycle(&mut hn, &mut sim, &mut mac);

    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);
    assert_eq!(hn.state(), HeadState::WaitProbes);
    assert_eq!(mac.drops_of(DropReason::NotEnabled), 1);
}

#[test]
fn cts_timeout_returns_to_idle_holding_off_the_auv() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 2);
    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);

    fire(&mut hn, TimerKind::CtsWait, &mut sim, &mut mac);

    assert_eq!(hn.last_idle(), HeadIdleReason::CtsTimeout);
    assert_eq!(hn.stats().cts_timeouts, 1);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: false
        }
    );
    assert_eq!(hn.uplink_len(), 2);
}

#[test]
fn cts_for_another_head_keeps_waiting() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 2);
    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);

    let other = cts(&mut mac, NodeId(20), 4);
    hn.on_packet(other, &mut sim, &mut mac);

    assert_eq!(hn.state_label(), "wait-cts");
    assert!(hn.timers().is_armed(TimerKind::CtsWait));
    assert_eq!(mac.drops_of(DropReason::WrongReceiver), 1);
}

#[test]
fn corrupted_cts_from_auv_abandons_the_exchange() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    with_local_data(&mut hn, &mut sim, &mut mac, 2);
    let t = trigger(&mut mac, NodeId::BROADCAST, 4);
    hn.on_packet(t, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    finish_last_tx(&mut hn, &mut sim, &mut mac);

    let c = cts(&mut mac, HN, 4);
    hn.on_packet(rx(&c, true), &mut sim, &mut mac);

    assert_eq!(hn.last_idle(), HeadIdleReason::CorruptedCts);
    assert_eq!(
        hn.state(),
        HeadState::Idle {
            accept_trigger: true
        }
    );
    assert!(mac.sent_of(PacketKind::Data).is_empty());
}

#[test]
fn direct_leg_sends_what_the_trigger_asks_for() {
    let cfg = HeadNodeConfig {
        comm_mode: CommMode::Direct,
        ..HeadNodeConfig::default()
    };
    let (mut hn, mut sim, mut mac) = head(cfg);
    assert_eq!(hn.comm_mode(), CommMode::Direct);
    with_local_data(&mut hn, &mut sim, &mut mac, 5);

    let t = trigger(&mut mac, HN, 3);
    hn.on_packet(t, &mut sim, &mut mac);
    fire(&mut hn, TimerKind::TriggerBackoff, &mut sim, &mut mac);
    assert_eq!(mac.last_sent().kind(), PacketKind::Data);
    drain_uplink(&mut hn, &mut sim, &mut mac);

    assert!(mac.sent_of(PacketKind::Rts).is_empty());
    assert_eq!(mac.sent_of(PacketKind::Data).len(), 3);
    assert_eq!(hn.uplink_len(), 2);
    assert_eq!(hn.last_idle(), HeadIdleReason::UplinkDone);
}

#[test]
fn trigger_for_another_head_is_wrong_receiver() {
    let (mut hn, mut sim, mut mac) = head(HeadNodeConfig::default());
    let t = trigger(&mut mac, NodeId(20), 4);
    hn.on_packet(t, &mut sim, &mut mac);

    assert_eq!(mac.drops_of(DropReason::WrongReceiver), 1);
    assert_eq!(hn.stats().trigger_rx, 0);
    assert_eq!(hn.last_idle(), HeadIdleReason::Startup);
}

#[test]
fn full_local_buffer_drops_app_data() {
    let cfg = HeadNodeConfig {
        local_buffer_size: 1,
        ..HeadNodeConfig::default()
    };
    let (mut hn, mut sim, mut mac) = head(cfg);
    with_local_data(&mut hn, &mut sim, &mut mac, 2);

    assert_eq!(hn.local_len(), 1);
    assert_eq!(hn.stats().buffer_drops, 1);
    assert_eq!(mac.drops_of(DropReason::BufferFull), 1);
}
