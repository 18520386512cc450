//! 性能统计
//!
//! 每个检测周期上报一次 `FrameMetrics`, `SessionStats` 维护整个会话的滚动统计

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 单个检测周期的指标
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameMetrics {
    pub inference: Duration,
    pub detections: usize,
    /// 本帧检测的平均置信度 (无检测时为0)
    pub mean_confidence: f32,
}

impl FrameMetrics {
    pub fn new(inference: Duration, confidences: impl IntoIterator<Item = f32>) -> Self {
        let (mut sum, mut count) = (0.0f32, 0usize);
        for c in confidences {
            sum += c;
            count += 1;
        }
        Self {
            inference,
            detections: count,
            mean_confidence: if count > 0 { sum / count as f32 } else { 0.0 },
        }
    }
}

/// 指标接收端
pub trait MetricsSink: Send {
    fn record(&mut self, metrics: &FrameMetrics);
}

impl<T: MetricsSink> MetricsSink for Arc<Mutex<T>> {
    fn record(&mut self, metrics: &FrameMetrics) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(metrics);
    }
}

/// 最小/最大/累计
#[derive(Clone, Copy, Debug, Default)]
struct Running {
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Running {
    fn push(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// 会话统计
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    frames: u64,
    total_detections: u64,
    frames_with_detections: u64,
    inference_ms: Running,
    frame_ms: Running,
    confidence: Running,
    last_frame: Option<Instant>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定时刻记录 (帧间隔由相邻两次记录计算)
    pub fn record_at(&mut self, metrics: &FrameMetrics, now: Instant) {
        self.frames += 1;
        self.total_detections += metrics.detections as u64;
        if metrics.detections > 0 {
            self.frames_with_detections += 1;
        }
        self.inference_ms.push(metrics.inference.as_secs_f64() * 1000.0);
        if metrics.mean_confidence > 0.0 {
            self.confidence.push(metrics.mean_confidence as f64);
        }
        if let Some(last) = self.last_frame {
            let ms = now.saturating_duration_since(last).as_secs_f64() * 1000.0;
            if ms > 0.0 {
                self.frame_ms.push(ms);
            }
        }
        self.last_frame = Some(now);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn avg_inference_ms(&self) -> f64 {
        self.inference_ms.mean()
    }

    pub fn min_inference_ms(&self) -> f64 {
        self.inference_ms.min
    }

    pub fn max_inference_ms(&self) -> f64 {
        self.inference_ms.max
    }

    pub fn avg_fps(&self) -> f64 {
        let ms = self.frame_ms.mean();
        if ms > 0.0 {
            1000.0 / ms
        } else {
            0.0
        }
    }

    /// 最慢帧对应的帧率
    pub fn min_fps(&self) -> f64 {
        if self.frame_ms.count == 0 {
            0.0
        } else {
            1000.0 / self.frame_ms.max
        }
    }

    /// 最快帧对应的帧率
    pub fn max_fps(&self) -> f64 {
        if self.frame_ms.count == 0 {
            0.0
        } else {
            1000.0 / self.frame_ms.min
        }
    }

    /// 有检测结果的帧占比 (0..1)
    pub fn detection_rate(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.frames_with_detections as f64 / self.frames as f64
        }
    }

    pub fn detections_per_frame(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_detections as f64 / self.frames as f64
        }
    }

    pub fn avg_confidence(&self) -> f64 {
        self.confidence.mean()
    }

    pub fn summary(&self) -> String {
        format!(
            "帧数:{} | 推理 avg {:.1}ms (min {:.1} / max {:.1}) | fps avg {:.1} (min {:.1} / max {:.1}) | 检测率 {:.1}% | {:.2}个/帧 | 平均置信度 {:.2}",
            self.frames,
            self.avg_inference_ms(),
            self.min_inference_ms(),
            self.max_inference_ms(),
            self.avg_fps(),
            self.min_fps(),
            self.max_fps(),
            self.detection_rate() * 100.0,
            self.detections_per_frame(),
            self.avg_confidence()
        )
    }
}

impl MetricsSink for SessionStats {
    fn record(&mut self, metrics: &FrameMetrics) {
        self.record_at(metrics, Instant::now());
    }
}
