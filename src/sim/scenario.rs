//! 场景描述（scenario.json）
//!
//! 节点按出现顺序编号：AUV 为 0，之后每个簇先是 HN，再是它的各个 SN。
//! 丢包规则里的 `from` / `to` 使用这个编号。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::CbrTraffic;
use crate::mac::{AuvConfig, CommMode, HeadNodeConfig, SensorConfig, TxMode};
use crate::net::{ChannelConfig, LossRule, Position};
use crate::sim::SimTime;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub defaults: Option<ScenarioDefaults>,
    pub auv: AuvSpec,
    pub clusters: Vec<ClusterSpec>,
    #[serde(default)]
    pub losses: Vec<LossRule>,
}

/// 对所有角色生效的默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioDefaults {
    #[serde(default)]
    pub comm_mode: Option<CommMode>,
    #[serde(default)]
    pub tx_mode: Option<TxMode>,
    #[serde(default)]
    pub payload_bytes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuvSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub position: Position,
    #[serde(default)]
    pub config: AuvOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub head: HeadSpec,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub position: Position,
    /// HN 自己产生的数据
    #[serde(default)]
    pub traffic: Option<CbrTraffic>,
    #[serde(default)]
    pub config: HeadOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub position: Position,
    #[serde(default)]
    pub traffic: Option<CbrTraffic>,
    #[serde(default)]
    pub config: SensorOverrides,
}

fn secs(v: Option<f64>, dst: &mut SimTime) {
    if let Some(s) = v {
        *dst = SimTime::from_secs_f64(s);
    }
}

fn set<T: Copy>(v: Option<T>, dst: &mut T) {
    if let Some(x) = v {
        *dst = x;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorOverrides {
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub poll_timeout_s: Option<f64>,
    #[serde(default)]
    pub cbeacon_timeout_s: Option<f64>,
    #[serde(default)]
    pub data_spacing_s: Option<f64>,
    #[serde(default)]
    pub guard_interval_s: Option<f64>,
}

impl SensorOverrides {
    pub fn apply(&self, cfg: &mut SensorConfig) {
        set(self.buffer_size, &mut cfg.buffer_size);
        secs(self.poll_timeout_s, &mut cfg.poll_timeout);
        secs(self.cbeacon_timeout_s, &mut cfg.cbeacon_timeout);
        secs(self.data_spacing_s, &mut cfg.data_spacing);
        secs(self.guard_interval_s, &mut cfg.guard_interval);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadOverrides {
    #[serde(default)]
    pub start_delay_s: Option<f64>,
    #[serde(default)]
    pub retry_delay_s: Option<f64>,
    #[serde(default)]
    pub probe_backoff_min_ms: Option<u32>,
    #[serde(default)]
    pub probe_backoff_max_ms: Option<u32>,
    #[serde(default)]
    pub max_polled_nodes: Option<usize>,
    #[serde(default)]
    pub probe_timeout_s: Option<f64>,
    #[serde(default)]
    pub max_cbeacon: Option<u32>,
    #[serde(default)]
    pub max_pck_from_node: Option<u32>,
    #[serde(default)]
    pub data_spacing_s: Option<f64>,
    #[serde(default)]
    pub guard_interval_s: Option<f64>,
    #[serde(default)]
    pub cts_timeout_s: Option<f64>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

impl HeadOverrides {
    pub fn apply(&self, cfg: &mut HeadNodeConfig) {
        secs(self.start_delay_s, &mut cfg.start_delay);
        secs(self.retry_delay_s, &mut cfg.retry_delay);
        set(self.probe_backoff_min_ms, &mut cfg.probe_backoff_min_ms);
        set(self.probe_backoff_max_ms, &mut cfg.probe_backoff_max_ms);
        set(self.max_polled_nodes, &mut cfg.max_polled_nodes);
        secs(self.probe_timeout_s, &mut cfg.probe_timeout);
        set(self.max_cbeacon, &mut cfg.max_cbeacon);
        set(self.max_pck_from_node, &mut cfg.max_pck_from_node);
        secs(self.data_spacing_s, &mut cfg.data_spacing);
        secs(self.guard_interval_s, &mut cfg.guard_interval);
        secs(self.cts_timeout_s, &mut cfg.cts_timeout);
        set(self.buffer_size, &mut cfg.buffer_size);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuvOverrides {
    #[serde(default)]
    pub trigger_start_delay_s: Option<f64>,
    #[serde(default)]
    pub backoff_min_ms: Option<u32>,
    #[serde(default)]
    pub backoff_max_ms: Option<u32>,
    #[serde(default)]
    pub rts_timeout_s: Option<f64>,
    #[serde(default)]
    pub guard_interval_s: Option<f64>,
    #[serde(default)]
    pub max_data_wanted: Option<u32>,
    #[serde(default)]
    pub rtt_estimate_s: Option<f64>,
}

impl AuvOverrides {
    pub fn apply(&self, cfg: &mut AuvConfig) {
        secs(self.trigger_start_delay_s, &mut cfg.trigger_start_delay);
        set(self.backoff_min_ms, &mut cfg.backoff_min_ms);
        set(self.backoff_max_ms, &mut cfg.backoff_max_ms);
        secs(self.rts_timeout_s, &mut cfg.rts_timeout);
        secs(self.guard_interval_s, &mut cfg.guard_interval);
        set(self.max_data_wanted, &mut cfg.max_data_wanted);
        secs(self.rtt_estimate_s, &mut cfg.rtt_estimate);
    }
}

impl ScenarioSpec {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ScenarioError> {
        let spec: ScenarioSpec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// AUV 加上全部 HN 与 SN
    pub fn node_count(&self) -> usize {
        1 + self
            .clusters
            .iter()
            .map(|c| 1 + c.sensors.len())
            .sum::<usize>()
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |msg: String| Err(ScenarioError::Invalid(msg));
        if self.schema_version != SCHEMA_VERSION {
            return invalid(format!(
                "unsupported schema_version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if self.clusters.is_empty() {
            return invalid("at least one cluster is required".to_string());
        }
        if self.channel.bitrate_bps == 0 {
            return invalid("channel.bitrate_bps must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.channel.packet_error_rate) {
            return invalid(format!(
                "channel.packet_error_rate {} is outside [0, 1]",
                self.channel.packet_error_rate
            ));
        }
        let traffic = self.clusters.iter().flat_map(|c| {
            c.head
                .traffic
                .iter()
                .chain(c.sensors.iter().filter_map(|s| s.traffic.as_ref()))
        });
        for t in traffic {
            if !(t.period_s > 0.0) {
                return invalid(format!("traffic period_s {} must be positive", t.period_s));
            }
        }
        let n = self.node_count();
        for rule in &self.losses {
            for idx in [rule.from, rule.to].into_iter().flatten() {
                if idx >= n {
                    return invalid(format!("loss rule refers to node {idx}, only {n} nodes"));
                }
            }
        }
        Ok(())
    }

    pub fn comm_mode(&self) -> CommMode {
        self.defaults
            .as_ref()
            .and_then(|d| d.comm_mode)
            .unwrap_or_default()
    }

    pub fn tx_mode(&self) -> TxMode {
        self.defaults
            .as_ref()
            .and_then(|d| d.tx_mode)
            .unwrap_or_default()
    }

    pub fn payload_bytes(&self) -> Option<u32> {
        self.defaults.as_ref().and_then(|d| d.payload_bytes)
    }
}
