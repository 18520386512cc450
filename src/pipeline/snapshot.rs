//! 采集线程 → 渲染线程的共享快照
//!
//! 单个互斥锁保护一份完整快照: 发布时整体替换, 读取时整体复制,
//! 锁内不做任何计算.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use image::RgbImage;

use crate::detection::types::TrackedObject;

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub tracks: Vec<TrackedObject>,
    /// 采样图像尺寸
    pub sample_width: u32,
    pub sample_height: u32,
    /// 采样区域在显示上的尺寸
    pub region_width: u32,
    pub region_height: u32,
    /// 开始采样的时刻
    pub captured_at: Instant,
    /// 递增帧号
    pub frame: u64,
    /// 采样图像 (仅在需要预览时附带)
    pub image: Option<Arc<RgbImage>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            sample_width: 0,
            sample_height: 0,
            region_width: 0,
            region_height: 0,
            captured_at: Instant::now(),
            frame: 0,
            image: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SharedSnapshot {
    inner: Arc<Mutex<Snapshot>>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换 (后写覆盖)
    pub fn publish(&self, snapshot: Snapshot) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// 复制最新快照
    pub fn latest(&self) -> Snapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
