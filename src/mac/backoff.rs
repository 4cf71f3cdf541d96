//! 随机回退
//!
//! 每个节点一个独立的伪随机源：默认以节点地址加墙钟时间播种，
//! 给定种子时改用 `seed ^ 地址`，便于复现。

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::net::NodeId;

#[derive(Debug, Clone)]
pub struct Backoff {
    rng: StdRng,
}

impl Backoff {
    pub fn new(addr: NodeId, seed: Option<u64>) -> Self {
        let mix = (addr.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let seed = match seed {
            Some(s) => s ^ mix,
            None => {
                let wall = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                wall.wrapping_add(mix)
            }
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 在 [min_ms, max_ms] 内均匀抽取（毫秒）；上下界颠倒时自动交换
    pub fn draw_ms(&mut self, min_ms: u32, max_ms: u32) -> u32 {
        let (lo, hi) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        self.rng.gen_range(lo..=hi)
    }
}
