//! 水声网络
//!
//! 持有全部节点与共享信道；负责把事件分派给节点，并作为 `MacApi` 的真实实现。

use std::any::Any;

use super::api::MacApi;
use super::channel::{AcousticChannel, ChannelConfig, Position, RxFate};
use super::deliver_packet::DeliverPacket;
use super::header::Header;
use super::id::NodeId;
use super::node::Node;
use super::packet::Packet;
use super::stats::Stats;
use super::tx_end::TxEnd;
use crate::app::DataSink;
use crate::mac::{DropReason, TimerKind};
use crate::sim::{SimTime, Simulator};
use crate::viz::{VizEvent, VizEventKind, VizLogger, VizNodeInfo, VizRole};
use tracing::{debug, trace, warn};

#[derive(Default)]
pub struct Network {
    nodes: Vec<Option<Box<dyn Node>>>,
    names: Vec<String>,
    roles: Vec<VizRole>,
    pub channel: AcousticChannel,
    next_pkt_id: u64,
    /// 每次发送一个编号；同一分组被转发时编号不同，碰撞按它登记
    next_tx_id: u64,
    pub stats: Stats,
    pub sink: DataSink,
    pub viz: Option<VizLogger>,
}

impl Network {
    pub fn new(cfg: ChannelConfig, seed: u64) -> Self {
        Self {
            channel: AcousticChannel::new(cfg, seed),
            ..Self::default()
        }
    }

    /// 添加节点；`build` 拿到分配好的地址后构造节点
    pub fn add_node<F>(&mut self, pos: Position, build: F) -> NodeId
    where
        F: FnOnce(NodeId) -> Box<dyn Node>,
    {
        let id = NodeId(self.nodes.len());
        let node = build(id);
        self.names.push(node.name().to_string());
        self.roles.push(node.role());
        self.nodes.push(Some(node));
        self.channel.add_node(pos);
        debug!(id = %id, name = %self.names[id.0], ?pos, "添加节点");
        id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.names.get(id.0).map(String::as_str).unwrap_or("?")
    }

    /// 以具体角色类型读取节点（用于仿真结束后读统计）
    pub fn node<T: Any>(&self, id: NodeId) -> Option<&T> {
        self.nodes
            .get(id.0)?
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    // 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
    fn with_node<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Node, &mut Network) -> R,
    ) -> Option<R> {
        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            warn!(id = %id, "节点不存在或正在处理中");
            return None;
        };
        let r = f(node.as_mut(), self);
        self.nodes[id.0] = Some(node);
        Some(r)
    }

    pub fn start_node(&mut self, id: NodeId, sim: &mut Simulator) {
        self.with_node(id, |node, net| node.start(sim, net));
    }

    /// 接收结束：合并碰撞标记后交给节点的 MAC
    #[tracing::instrument(level = "debug", skip(self, pkt, sim), fields(pkt_id = pkt.id))]
    pub fn deliver(&mut self, to: NodeId, tx_id: u64, mut pkt: Packet, sim: &mut Simulator) {
        if self.channel.take_collided(to, tx_id) {
            self.stats.collisions += 1;
            pkt.error = true;
        }
        self.stats.rx_pkts += 1;
        if pkt.error {
            self.stats.rx_corrupted += 1;
        }
        self.viz_push(
            sim.now(),
            Some(to),
            Some(pkt.id),
            VizEventKind::Rx {
                pkt_kind: pkt.kind(),
                src: pkt.src.0,
                corrupted: pkt.error,
            },
        );
        self.with_node(to, |node, net| node.on_packet(pkt, sim, net));
    }

    pub fn tx_end(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        trace!(at = %at, pkt_id = pkt.id, kind = pkt.kind().label(), "发送结束");
        self.with_node(at, |node, net| node.on_tx_end(&pkt, sim, net));
    }

    pub fn fire_timer(&mut self, at: NodeId, kind: TimerKind, token: u64, sim: &mut Simulator) {
        self.with_node(at, |node, net| node.on_timer(kind, token, sim, net));
    }

    /// 上层数据到达某节点
    pub fn app_data(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        self.with_node(at, |node, net| node.on_app_data(pkt, sim, net));
    }

    fn viz_push(&mut self, t: SimTime, node: Option<NodeId>, pkt_id: Option<u64>, kind: VizEventKind) {
        if let Some(v) = &mut self.viz {
            v.push(VizEvent {
                t_ns: t.0,
                node: node.map(|n| n.0),
                pkt_id,
                kind,
            });
        }
    }

    /// 发出 meta 事件（节点、角色、位置）
    pub fn emit_viz_meta(&mut self) {
        if self.viz.is_none() {
            return;
        }
        let nodes = (0..self.nodes.len())
            .map(|i| {
                let pos = self.channel.position(NodeId(i)).unwrap_or_default();
                VizNodeInfo {
                    id: i,
                    name: self.names[i].clone(),
                    role: self.roles.get(i).copied().unwrap_or(VizRole::Other),
                    pos: [pos.x, pos.y, pos.z],
                }
            })
            .collect::<Vec<_>>();
        self.viz_push(SimTime::ZERO, None, None, VizEventKind::Meta { nodes });
    }
}

impl MacApi for Network {
    fn make_packet(&mut self, src: NodeId, dst: NodeId, hdr: Header) -> Packet {
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        Packet::new(id, src, dst, hdr)
    }

    #[tracing::instrument(level = "debug", skip(self, pkt, sim), fields(pkt_id = pkt.id, kind = pkt.kind().label(), dst = %pkt.dst))]
    fn send(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator) {
        let now = sim.now();
        let (start, depart) = self.channel.reserve_tx(from, now, pkt.size_bytes);
        let tx_id = self.next_tx_id;
        self.next_tx_id = self.next_tx_id.wrapping_add(1);
        *self.stats.tx_pkts.entry(pkt.kind()).or_default() += 1;
        debug!(start = %start, depart = %depart, size_bytes = pkt.size_bytes, "🚀 开始发送");
        self.viz_push(
            now,
            Some(from),
            Some(pkt.id),
            VizEventKind::Tx {
                pkt_kind: pkt.kind(),
                dst: (!pkt.dst.is_broadcast()).then_some(pkt.dst.0),
                size_bytes: pkt.size_bytes,
                depart_ns: depart.0,
            },
        );

        for idx in 0..self.nodes.len() {
            let to = NodeId(idx);
            if to == from || !self.channel.in_range(from, to) {
                continue;
            }
            let fate = self.channel.fate(from, to, pkt.kind());
            if fate == RxFate::Lost {
                self.stats.lost += 1;
                continue;
            }
            let prop = self.channel.propagation_delay(from, to);
            let arrive_start = start.saturating_add(prop);
            let arrive_end = depart.saturating_add(prop);
            self.channel
                .register_reception(to, tx_id, arrive_start, arrive_end, now);
            let mut copy = pkt.clone();
            copy.error = fate == RxFate::Corrupted;
            trace!(to = %to, arrive_end = %arrive_end, corrupted = copy.error, "调度接收");
            sim.schedule(arrive_end, DeliverPacket { to, tx_id, pkt: copy });
        }

        sim.schedule(depart, TxEnd { at: from, pkt });
    }

    fn tx_duration(&self, size_bytes: u32) -> SimTime {
        self.channel.tx_time(size_bytes)
    }

    fn deliver_up(&mut self, at: NodeId, pkt: Packet, sim: &Simulator) {
        self.stats.app_delivered += 1;
        if let Some(d) = pkt.data() {
            let latency = sim.now().saturating_sub(d.created_at);
            self.viz_push(
                sim.now(),
                Some(at),
                Some(pkt.id),
                VizEventKind::Deliver {
                    origin: d.origin.0,
                    seq: d.seq,
                    latency_ns: latency.0,
                },
            );
        }
        self.sink.record(at, &pkt, sim.now());
    }

    fn drop_packet(&mut self, at: NodeId, pkt: &Packet, reason: DropReason, sim: &Simulator) {
        *self.stats.drops.entry(reason.code()).or_default() += 1;
        debug!(at = %at, pkt_id = pkt.id, kind = pkt.kind().label(), src = %pkt.src, reason = reason.code(), "🗑️  丢弃分组: {reason}");
        self.viz_push(
            sim.now(),
            Some(at),
            Some(pkt.id),
            VizEventKind::Drop {
                pkt_kind: pkt.kind(),
                reason: reason.code().to_string(),
            },
        );
    }

    fn state_changed(&mut self, at: NodeId, from: &'static str, to: &'static str, sim: &Simulator) {
        trace!(at = %at, from, to, "状态迁移");
        self.viz_push(
            sim.now(),
            Some(at),
            None,
            VizEventKind::State {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }
}
