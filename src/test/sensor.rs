use super::mock::{MockMac, finish_last_tx, rx, token_of};
use crate::mac::{DropReason, SensorConfig, SensorCycle, SensorNode, SensorState, TimerKind, TxMode};
use crate::net::{GrantHdr, Header, Node, NodeId, Packet, PacketKind, TriggerHdr};
use crate::sim::{SimTime, Simulator};

const SN: NodeId = NodeId(1);
const HN: NodeId = NodeId(10);

fn sensor(cfg: SensorConfig, queued: u64) -> (SensorNode, Simulator, MockMac) {
    let mut sim = Simulator::default();
    let mut mac = MockMac::default();
    let mut sn = SensorNode::new(SN, "sn1", cfg, Some(7));
    sn.start(&mut sim, &mut mac);
    for seq in 0..queued {
        let pkt = mac.data(SN, seq);
        sn.on_app_data(pkt, &mut sim, &mut mac);
    }
    (sn, sim, mac)
}

fn fire(sn: &mut SensorNode, kind: TimerKind, sim: &mut Simulator, mac: &mut MockMac) {
    let token = token_of(sn.timers(), kind);
    sn.on_timer(kind, token, sim, mac);
}

fn poll(mac: &mut MockMac, from: NodeId, to: NodeId, max_data: u32) -> Packet {
    mac.packet(
        from,
        to,
        Header::Poll(GrantHdr {
            max_data,
            responder: to,
        }),
    )
}

/// BEACON -> 回退 -> PROBE -> 等 POLL
fn probe_and_wait(sn: &mut SensorNode, sim: &mut Simulator, mac: &mut MockMac, max_cbeacon: u32) {
    let b = mac.beacon(HN, 2_000, max_cbeacon);
    sn.on_packet(b, sim, mac);
    assert_eq!(sn.state(), SensorState::Backoff);
    fire(sn, TimerKind::ProbeBackoff, sim, mac);
    assert_eq!(sn.state(), SensorState::ProbeTx);
    finish_last_tx(sn, sim, mac);
    assert_eq!(sn.state(), SensorState::WaitPoll);
}

/// 持续结束发送 / 触发间隔定时器，直到 DATA 发完
fn drain_data(sn: &mut SensorNode, sim: &mut Simulator, mac: &mut MockMac) {
    loop {
        match sn.state() {
            SensorState::DataTx(_) => finish_last_tx(sn, sim, mac),
            SensorState::DataSpacing(_) => fire(sn, TimerKind::DataSpacing, sim, mac),
            _ => break,
        }
    }
}

#[test]
fn beacon_with_queued_data_backs_off_within_window() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 3);
    let b = mac.beacon(HN, 2_000, 2);
    sn.on_packet(b, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Backoff);
    let deadline = sn
        .timers()
        .deadline(TimerKind::ProbeBackoff)
        .expect("backoff armed");
    assert!(deadline <= SimTime::from_secs(2));
    assert_eq!(sn.cycle().head, Some(HN));
    assert_eq!(sn.cycle().beacon_rx, 1);
    assert!(mac.sent.is_empty());
}

#[test]
fn probe_advertises_queue_length_and_goes_to_the_beacon_sender() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 3);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let probes = mac.sent_of(PacketKind::Probe);
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].dst, HN);
    let ann = probes[0].announce().expect("probe header");
    assert_eq!(ann.num_data, 3);
    assert_eq!(ann.backoff_ms, sn.cycle().backoff_ms);
    assert!(sn.timers().is_armed(TimerKind::PollWait));
}

#[test]
fn matching_poll_sends_granted_data_spaced_then_waits_for_cbeacon() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 3);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let p = poll(&mut mac, HN, SN, 3);
    sn.on_packet(p, &mut sim, &mut mac);
    assert!(!sn.timers().is_armed(TimerKind::PollWait));
    assert!(matches!(sn.state(), SensorState::DataTx(_)));

    finish_last_tx(&mut sn, &mut sim, &mut mac);
    assert!(matches!(sn.state(), SensorState::DataSpacing(_)));
    assert_eq!(
        sn.timers().deadline(TimerKind::DataSpacing),
        Some(SimTime::from_secs(1))
    );

    drain_data(&mut sn, &mut sim, &mut mac);
    let data = mac.sent_of(PacketKind::Data);
    assert_eq!(data.len(), 3);
    assert!(data.iter().all(|p| p.dst == HN && p.src == SN));
    let seqs = data
        .iter()
        .map(|p| p.data().expect("data header").seq)
        .collect::<Vec<_>>();
    assert_eq!(seqs, vec![0, 1, 2]);

    assert_eq!(sn.state(), SensorState::WaitCbeacon);
    assert!(sn.cycle().data_sent);
    assert_eq!(sn.cycle().data_tx, 3);
    assert_eq!(sn.queue_len(), 0);
    assert!(sn.timers().is_armed(TimerKind::CbeaconWait));
}

#[test]
fn grant_smaller_than_queue_leaves_the_rest_queued() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 5);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let p = poll(&mut mac, HN, SN, 2);
    sn.on_packet(p, &mut sim, &mut mac);
    drain_data(&mut sn, &mut sim, &mut mac);

    assert_eq!(mac.sent_of(PacketKind::Data).len(), 2);
    assert_eq!(sn.queue_len(), 3);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);
}

#[test]
fn burst_mode_sends_back_to_back_without_spacing_timer() {
    let cfg = SensorConfig {
        tx_mode: TxMode::Burst,
        ..SensorConfig::default()
    };
    let (mut sn, mut sim, mut mac) = sensor(cfg, 3);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);
    let p = poll(&mut mac, HN, SN, 3);
    sn.on_packet(p, &mut sim, &mut mac);

    for _ in 0..2 {
        finish_last_tx(&mut sn, &mut sim, &mut mac);
        assert!(matches!(sn.state(), SensorState::DataTx(_)));
        assert!(!sn.timers().is_armed(TimerKind::DataSpacing));
    }
    finish_last_tx(&mut sn, &mut sim, &mut mac);
    assert_eq!(mac.sent_of(PacketKind::Data).len(), 3);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);
}

#[test]
fn poll_for_another_sensor_extends_the_poll_wait() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 2);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);
    assert_eq!(
        sn.timers().deadline(TimerKind::PollWait),
        Some(SimTime::from_secs(20))
    );

    let other = poll(&mut mac, HN, NodeId(2), 4);
    sn.on_packet(other, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::WaitPoll);
    assert_eq!(
        sn.timers().deadline(TimerKind::PollWait),
        Some(SimTime::from_secs(24))
    );
    assert_eq!(mac.drops_of(DropReason::WrongReceiver), 1);
    assert!(mac.sent_of(PacketKind::Data).is_empty());
}

#[test]
fn poll_wait_timeout_returns_to_idle_with_counters_cleared() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 2);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    fire(&mut sn, TimerKind::PollWait, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Idle);
    assert_eq!(sn.cycle(), &SensorCycle::default());
    assert_eq!(sn.timers().armed().count(), 0);
    assert_eq!(sn.stats().poll_timeouts, 1);
    assert_eq!(sn.queue_len(), 2);
}

#[test]
fn cbeacon_after_data_is_dropped_until_budget_reached() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 1);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);
    let p = poll(&mut mac, HN, SN, 1);
    sn.on_packet(p, &mut sim, &mut mac);
    drain_data(&mut sn, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);

    let c1 = mac.cbeacon(HN, 2_000, 2);
    sn.on_packet(c1, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);
    assert_eq!(sn.cycle().cbeacon_rx, 1);
    assert_eq!(mac.drops_of(DropReason::CbeaconDataAlreadySent), 1);

    let c2 = mac.cbeacon(HN, 2_000, 2);
    sn.on_packet(c2, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::Idle);
    assert_eq!(mac.drops_of(DropReason::CbeaconDataAlreadySent), 2);
    assert_eq!(sn.cycle(), &SensorCycle::default());
}

#[test]
fn cbeacon_before_data_sent_re_enters_backoff() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 0);
    let b = mac.beacon(HN, 1_000, 2);
    sn.on_packet(b, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);

    let pkt = mac.data(SN, 0);
    sn.on_app_data(pkt, &mut sim, &mut mac);
    let c = mac.cbeacon(HN, 1_000, 2);
    sn.on_packet(c, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Backoff);
    assert!(!sn.timers().is_armed(TimerKind::CbeaconWait));
    assert!(sn.timers().is_armed(TimerKind::ProbeBackoff));
    assert_eq!(sn.cycle().cbeacon_rx, 1);
}

#[test]
fn cbeacon_while_waiting_for_poll_gives_another_probe_chance() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 2);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let c = mac.cbeacon(HN, 1_000, 2);
    sn.on_packet(c, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::Backoff);
    assert!(!sn.timers().is_armed(TimerKind::PollWait));

    fire(&mut sn, TimerKind::ProbeBackoff, &mut sim, &mut mac);
    assert_eq!(mac.sent_of(PacketKind::Probe).len(), 2);
}

#[test]
fn empty_queue_and_no_cbeacon_budget_stays_idle() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 0);
    let b = mac.beacon(HN, 1_000, 0);
    sn.on_packet(b, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Idle);
    assert_eq!(sn.timers().armed().count(), 0);
    assert!(mac.sent.is_empty());
}

#[test]
fn corrupted_packet_from_awaited_head_falls_back_to_idle() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 1);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);
    let p = poll(&mut mac, HN, SN, 1);
    sn.on_packet(p, &mut sim, &mut mac);
    drain_data(&mut sn, &mut sim, &mut mac);
    assert_eq!(sn.state(), SensorState::WaitCbeacon);

    let c = mac.cbeacon(HN, 1_000, 2);
    sn.on_packet(rx(&c, true), &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Idle);
    assert_eq!(sn.timers().armed().count(), 0);
    assert_eq!(sn.cycle(), &SensorCycle::default());
    assert_eq!(mac.drops_of(DropReason::Corrupted), 1);
    assert_eq!(sn.stats().cbeacon_rx_corrupted, 1);
}

#[test]
fn corrupted_packet_from_other_head_is_only_dropped() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 1);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let foreign = mac.beacon(NodeId(20), 1_000, 2);
    sn.on_packet(rx(&foreign, true), &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::WaitPoll);
    assert!(sn.timers().is_armed(TimerKind::PollWait));
    assert_eq!(mac.drops_of(DropReason::Corrupted), 1);
}

#[test]
fn beacon_from_awaited_head_while_waiting_is_not_enabled_and_resets() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 1);
    probe_and_wait(&mut sn, &mut sim, &mut mac, 2);

    let b = mac.beacon(HN, 1_000, 2);
    sn.on_packet(b, &mut sim, &mut mac);

    assert_eq!(mac.drops_of(DropReason::NotEnabled), 1);
    assert_eq!(sn.state(), SensorState::Idle);
}

#[test]
fn packets_the_sensor_cannot_use_get_typed_drop_reasons() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 0);

    let trig = mac.packet(
        NodeId(0),
        NodeId::BROADCAST,
        Header::Trigger(TriggerHdr {
            t_min_ms: 0,
            t_max_ms: 100,
            max_data_wanted: 4,
        }),
    );
    sn.on_packet(trig, &mut sim, &mut mac);
    assert_eq!(mac.drops_of(DropReason::CannotReceiveKind), 1);

    let mut other_data = mac.data(NodeId(2), 0);
    other_data.dst = HN;
    sn.on_packet(other_data, &mut sim, &mut mac);
    assert_eq!(mac.drops_of(DropReason::WrongReceiver), 1);

    assert_eq!(sn.state(), SensorState::Idle);
}

#[test]
fn full_buffer_drops_the_newest_packet() {
    let cfg = SensorConfig {
        buffer_size: 2,
        ..SensorConfig::default()
    };
    let (sn, _sim, mac) = sensor(cfg, 3);

    assert_eq!(sn.queue_len(), 2);
    assert_eq!(sn.stats().app_enqueued, 2);
    assert_eq!(sn.stats().app_dropped, 1);
    assert_eq!(mac.drops, vec![(PacketKind::Data, DropReason::BufferFull)]);
}

#[test]
fn stale_timer_token_is_ignored() {
    let (mut sn, mut sim, mut mac) = sensor(SensorConfig::default(), 1);
    let b = mac.beacon(HN, 2_000, 2);
    sn.on_packet(b, &mut sim, &mut mac);
    let token = token_of(sn.timers(), TimerKind::ProbeBackoff);

    sn.on_timer(TimerKind::ProbeBackoff, token + 1, &mut sim, &mut mac);

    assert_eq!(sn.state(), SensorState::Backoff);
    assert!(mac.sent.is_empty());
    assert!(sn.timers().is_armed(TimerKind::ProbeBackoff));
}
