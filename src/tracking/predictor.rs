//! 延迟补偿预测
//!
//! 渲染时按 "采集时刻 → 当前时刻" 的延迟把轨迹沿速度方向外推

use crate::detection::types::{TrackedObject, Vec2};

/// 最大补偿延迟 (秒)
pub const MAX_LATENCY: f32 = 0.25;
/// 低于此速度不外推
pub const MIN_SPEED: f32 = 15.0;
/// 单轴最大位移 (像素)
pub const MAX_SHIFT: f32 = 500.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Predictor {
    pub enabled: bool,
    /// 外推增益
    pub gain: f32,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            enabled: true,
            gain: 1.0,
        }
    }
}

impl Predictor {
    pub fn new(enabled: bool, gain: f32) -> Self {
        Self { enabled, gain }
    }

    /// 按延迟外推轨迹位置
    pub fn predict(&self, tracks: &[TrackedObject], elapsed_seconds: f32) -> Vec<TrackedObject> {
        if !self.enabled {
            return tracks.to_vec();
        }

        let latency = elapsed_seconds.clamp(0.0, MAX_LATENCY);
        tracks
            .iter()
            .map(|t| {
                if t.speed() < MIN_SPEED {
                    return t.clone();
                }
                let shift = Vec2::new(
                    (t.velocity.x * latency * self.gain).clamp(-MAX_SHIFT, MAX_SHIFT),
                    (t.velocity.y * latency * self.gain).clamp(-MAX_SHIFT, MAX_SHIFT),
                );
                TrackedObject {
                    rect: t.rect.translate(shift),
                    ..t.clone()
                }
            })
            .collect()
    }
}
