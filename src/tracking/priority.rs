//! 优先目标选择 + 距离估计

use serde::{Deserialize, Serialize};

use crate::detection::types::{TrackedObject, Vec2};

/// 优先级模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    /// 框高度最大 (离得最近)
    Largest,
    /// 底边最低 (画面最下方)
    #[default]
    Lowest,
    /// 离参考中心最近
    Centered,
}

impl PriorityMode {
    /// 数字编号: 0 = Largest, 1 = Lowest, 2 = Centered
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::Largest),
            1 => Some(Self::Lowest),
            2 => Some(Self::Centered),
            _ => None,
        }
    }

    pub fn index(&self) -> i32 {
        match self {
            Self::Largest => 0,
            Self::Lowest => 1,
            Self::Centered => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PrioritySelector {
    pub enabled: bool,
    pub mode: PriorityMode,
}

impl PrioritySelector {
    pub fn new(enabled: bool, mode: PriorityMode) -> Self {
        Self { enabled, mode }
    }

    /// 选出优先目标的下标, 并列时取第一个
    pub fn select_closest(
        &self,
        tracks: &[TrackedObject],
        reference_width: u32,
        reference_height: u32,
    ) -> Option<usize> {
        if !self.enabled || tracks.is_empty() {
            return None;
        }

        let center = Vec2::new(reference_width as f32 / 2.0, reference_height as f32 / 2.0);
        let mut best: Option<(usize, f32)> = None;

        for (i, t) in tracks.iter().enumerate() {
            // 统一为 "越大越优先"
            let score = match self.mode {
                PriorityMode::Largest => t.rect.height,
                PriorityMode::Lowest => t.rect.bottom(),
                PriorityMode::Centered => -(t.rect.center() - center).norm(),
            };
            match best {
                Some((_, s)) if score <= s => {}
                _ => best = Some((i, score)),
            }
        }

        best.map(|(i, _)| i)
    }
}

/// 单目测距: 距离 ≈ scale / 像素高度
pub fn estimate_distance(scale: f32, box_pixel_height: f32) -> Option<f32> {
    (box_pixel_height > 1.0).then(|| scale / box_pixel_height)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceEstimator {
    pub enabled: bool,
    pub scale: f32,
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 1000.0,
        }
    }
}

impl DistanceEstimator {
    pub fn new(enabled: bool, scale: f32) -> Self {
        Self { enabled, scale }
    }

    pub fn estimate(&self, box_pixel_height: f32) -> Option<f32> {
        if !self.enabled {
            return None;
        }
        estimate_distance(self.scale, box_pixel_height)
    }

    /// 标签后缀, 如 " [12m]"; 未启用或高度过小时为空
    pub fn tag(&self, box_pixel_height: f32) -> String {
        match self.estimate(box_pixel_height) {
            Some(d) => format!(" [{}m]", d as i32),
            None => String::new(),
        }
    }
}
