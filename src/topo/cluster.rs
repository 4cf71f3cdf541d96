//! 簇状拓扑构建
//!
//! 一个 AUV 加若干个簇，每个簇由一个 HN 和它的 SN 组成。
//! 节点编号：AUV 为 0，之后按簇依次为 HN、各 SN。

use tracing::info;

use crate::mac::{
    Auv, AuvConfig, CommMode, HeadNode, HeadNodeConfig, SensorConfig, SensorNode, TxMode,
};
use crate::net::{NetWorld, Network, NodeId, StartNode};
use crate::sim::{ScenarioSpec, SimTime, Simulator};
use crate::viz::VizLogger;

/// 命令行覆盖场景文件中的设置
#[derive(Debug, Clone, Default)]
pub struct BuildOpts {
    pub comm_mode: Option<CommMode>,
    pub tx_mode: Option<TxMode>,
    pub seed: Option<u64>,
    /// 记录协议事件
    pub viz: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLayout {
    pub auv: NodeId,
    pub heads: Vec<NodeId>,
    /// 与 `heads` 一一对应
    pub sensors: Vec<Vec<NodeId>>,
}

impl ClusterLayout {
    pub fn all_sensors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sensors.iter().flatten().copied()
    }
}

/// 按场景建网：添加节点、登记丢包规则、在 t=0 启动全部节点并调度数据源
pub fn build_scenario(
    sim: &mut Simulator,
    spec: &ScenarioSpec,
    opts: &BuildOpts,
) -> (NetWorld, ClusterLayout) {
    let seed = opts.seed.or(spec.seed);
    let comm_mode = opts.comm_mode.unwrap_or_else(|| spec.comm_mode());
    let tx_mode = opts.tx_mode.unwrap_or_else(|| spec.tx_mode());

    let mut net = Network::new(spec.channel.clone(), seed.unwrap_or(0));
    if opts.viz {
        net.viz = Some(VizLogger::default());
    }

    // HN 的编号在建 AUV 之前就要知道（直接发送模式下 AUV 轮流单播）
    let mut next = 1;
    let head_ids = spec
        .clusters
        .iter()
        .map(|c| {
            let id = NodeId(next);
            next += 1 + c.sensors.len();
            id
        })
        .collect::<Vec<_>>();

    let mut auv_cfg = AuvConfig {
        comm_mode,
        head_nodes: head_ids.clone(),
        ..AuvConfig::default()
    };
    if let Some(p) = spec.payload_bytes() {
        auv_cfg.payload_bytes = p;
    }
    spec.auv.config.apply(&mut auv_cfg);
    let auv_name = spec.auv.name.clone().unwrap_or_else(|| "auv".to_string());
    let auv = net.add_node(spec.auv.position, |id| {
        Box::new(Auv::new(id, auv_name, auv_cfg))
    });

    let mut layout = ClusterLayout {
        auv,
        heads: Vec::with_capacity(spec.clusters.len()),
        sensors: Vec::with_capacity(spec.clusters.len()),
    };
    let mut traffic = Vec::new();

    for (ci, cluster) in spec.clusters.iter().enumerate() {
        let mut head_cfg = HeadNodeConfig {
            comm_mode,
            tx_mode,
            ..HeadNodeConfig::default()
        };
        if let Some(p) = spec.payload_bytes() {
            head_cfg.payload_bytes = p;
        }
        cluster.head.config.apply(&mut head_cfg);
        let head_payload = head_cfg.payload_bytes;
        let head_name = cluster
            .head
            .name
            .clone()
            .unwrap_or_else(|| format!("hn{ci}"));
        let head = net.add_node(cluster.head.position, |id| {
            Box::new(HeadNode::new(id, head_name, head_cfg, seed))
        });
        debug_assert_eq!(head, head_ids[ci]);
        if let Some(t) = &cluster.head.traffic {
            traffic.push(t.first_event(head, head_payload));
        }

        let mut members = Vec::with_capacity(cluster.sensors.len());
        for (si, s) in cluster.sensors.iter().enumerate() {
            let mut cfg = SensorConfig {
                tx_mode,
                ..SensorConfig::default()
            };
            if let Some(p) = spec.payload_bytes() {
                cfg.payload_bytes = p;
            }
            s.config.apply(&mut cfg);
            let payload = cfg.payload_bytes;
            let name = s.name.clone().unwrap_or_else(|| format!("sn{ci}.{si}"));
            let sn = net.add_node(s.position, |id| {
                Box::new(SensorNode::new(id, name, cfg, seed))
            });
            if let Some(t) = &s.traffic {
                traffic.push(t.first_event(sn, payload));
            }
            members.push(sn);
        }
        layout.heads.push(head);
        layout.sensors.push(members);
    }

    for rule in &spec.losses {
        net.channel.add_rule(rule.clone());
    }

    let mut world = NetWorld::new(net);
    world.net.emit_viz_meta();

    for i in 0..world.net.node_count() {
        sim.schedule(SimTime::ZERO, StartNode { node: NodeId(i) });
    }
    for (at, ev) in traffic {
        sim.schedule(at, ev);
    }

    info!(
        nodes = world.net.node_count(),
        clusters = layout.heads.len(),
        mode = comm_mode.label(),
        seed = ?seed,
        "🌊 场景构建完成"
    );
    (world, layout)
}
