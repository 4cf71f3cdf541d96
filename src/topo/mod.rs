//! 场景构建

pub mod cluster;

pub use cluster::{BuildOpts, ClusterLayout, build_scenario};
