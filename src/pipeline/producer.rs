//! 采集线程 (Producer)
//! 职责: 区域采样 → 检测 → 跟踪 → 发布快照

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::metrics::{FrameMetrics, MetricsSink};
use super::snapshot::{SharedSnapshot, Snapshot};
use crate::config::{Settings, SettingsHandle};
use crate::detection::ObjectDetector;
use crate::input::{RegionSampler, SampleQuality};
use crate::tracking::Tracker;

/// 检测关闭时的空转间隔
const IDLE_SLEEP: Duration = Duration::from_millis(100);

pub struct Producer {
    sampler: RegionSampler,
    detector: Box<dyn ObjectDetector>,
    tracker: Tracker,
    settings: SettingsHandle,
    shared: SharedSnapshot,
    metrics: Option<Box<dyn MetricsSink>>,
    frame: u64,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl Producer {
    pub fn new(
        sampler: RegionSampler,
        detector: Box<dyn ObjectDetector>,
        settings: SettingsHandle,
        shared: SharedSnapshot,
    ) -> Self {
        let smoothing = settings.snapshot().smoothing_factor;
        Self {
            sampler,
            detector,
            tracker: Tracker::new(smoothing),
            settings,
            shared,
            metrics: None,
            frame: 0,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    pub fn with_metrics(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// 单次迭代
    pub fn step(&mut self) -> Result<()> {
        let settings = self.settings.snapshot();
        self.step_with(&settings)
    }

    fn step_with(&mut self, settings: &Settings) -> Result<()> {
        // 0. 同步配置
        self.tracker.set_smoothing_factor(settings.smoothing_factor);
        self.detector.set_input_resolution(settings.input_resolution);
        self.sampler.set_quality(if settings.fast_capture {
            SampleQuality::Fast
        } else {
            SampleQuality::Smooth
        });
        self.sampler.configure(settings.sample_size, settings.sample_size);

        // 1. 以显示中心为中心的采样区域
        let (dw, dh) = self.sampler.display_size();
        let fov_w = settings.fov_width.clamp(1, dw.max(1)) as i64;
        let fov_h = settings.fov_height.clamp(1, dh.max(1)) as i64;
        self.sampler.set_region(
            dw as i64 / 2 - fov_w / 2,
            dh as i64 / 2 - fov_h / 2,
            fov_w,
            fov_h,
        );

        // 2. 采样
        let captured_at = Instant::now();
        let image = self.sampler.capture()?;

        // 3. 检测 + 跟踪
        let mut tracks = Vec::new();
        if settings.detection_enabled && self.detector.is_loaded() {
            let t = Instant::now();
            let detections =
                self.detector
                    .detect(&image, settings.conf_threshold, settings.nms_threshold);
            let inference = t.elapsed();

            if let Some(sink) = self.metrics.as_mut() {
                sink.record(&FrameMetrics::new(
                    inference,
                    detections.iter().map(|d| d.confidence),
                ));
            }

            self.tracker.update(&detections);
            tracks = self.tracker.processed();
            self.log_stats(tracks.len(), inference);
        }

        // 4. 发布
        self.frame += 1;
        let region = self.sampler.region();
        let (sample_width, sample_height) = image.dimensions();
        self.shared.publish(Snapshot {
            tracks,
            sample_width,
            sample_height,
            region_width: region.width,
            region_height: region.height,
            captured_at,
            frame: self.frame,
            image: settings.share_preview.then(|| Arc::new(image)),
        });
        Ok(())
    }

    fn log_stats(&mut self, tracks: usize, inference: Duration) {
        self.count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = now;
        }

        // 每60帧打印一次
        if self.frame % 60 == 0 {
            tracing::info!(
                "🎯 检测+跟踪: {}个目标 | 推理:{:.1}ms | {:.1}fps | 轨迹:{}",
                tracks,
                inference.as_secs_f64() * 1000.0,
                self.current_fps,
                self.tracker.track_count()
            );
        }
    }

    /// 循环执行直到停止标志被设置
    pub fn run(&mut self, stop: &AtomicBool) {
        tracing::info!("🔍 采集线程启动");

        while !stop.load(Ordering::Relaxed) {
            let start = Instant::now();
            let settings = self.settings.snapshot();

            if let Err(e) = self.step_with(&settings) {
                tracing::warn!("⚠️ 采集失败: {:#}", e);
            }

            let work = start.elapsed();
            if settings.target_fps > 0 {
                let budget = Duration::from_secs_f64(1.0 / settings.target_fps as f64);
                if let Some(rest) = budget.checked_sub(work) {
                    std::thread::sleep(rest);
                }
            } else if !settings.detection_enabled {
                std::thread::sleep(IDLE_SLEEP);
            }
        }

        tracing::info!("🛑 采集线程退出 (共 {} 帧)", self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{Detection, Rect};
    use crate::detection::Detector;
    use crate::input::StillImageDisplay;
    use crate::pipeline::metrics::SessionStats;
    use image::{RgbImage, RgbaImage};

    /// 固定返回一个检测框
    struct FixedDetector {
        rect: Rect,
    }

    impl ObjectDetector for FixedDetector {
        fn is_loaded(&self) -> bool {
            true
        }

        fn set_input_resolution(&mut self, _size: u32) {}

        fn detect(&mut self, _image: &RgbImage, _conf: f32, _nms: f32) -> Vec<Detection> {
            vec![Detection::new(self.rect, 0.9, 0, "target")]
        }
    }

    fn sampler(w: u32, h: u32) -> RegionSampler {
        RegionSampler::new(Box::new(StillImageDisplay::new(RgbaImage::new(w, h))))
    }

    #[test]
    fn test_step_without_model_publishes_empty() {
        let shared = SharedSnapshot::new();
        let settings = SettingsHandle::new(Settings::default());
        let mut producer = Producer::new(
            sampler(1920, 1080),
            Box::new(Detector::new()),
            settings,
            shared.clone(),
        );
        producer.step().unwrap();
        producer.step().unwrap();

        let snap = shared.latest();
        assert_eq!(snap.frame, 2);
        assert!(snap.tracks.is_empty());
        assert_eq!((snap.sample_width, snap.sample_height), (640, 640));
        assert_eq!((snap.region_width, snap.region_height), (640, 640));
        assert!(snap.image.is_none());
    }

    #[test]
    fn test_region_clamped_to_small_display() {
        let shared = SharedSnapshot::new();
        let settings = SettingsHandle::new(Settings {
            sample_size: 64,
            share_preview: true,
            ..Settings::default()
        });
        let mut producer = Producer::new(
            sampler(320, 200),
            Box::new(Detector::new()),
            settings,
            shared.clone(),
        );
        producer.step().unwrap();
        let snap = shared.latest();
        assert_eq!((snap.region_width, snap.region_height), (320, 200));
        assert_eq!(snap.image.map(|i| i.dimensions()), Some((64, 64)));
    }

    #[test]
    fn test_step_tracks_detections() {
        let shared = SharedSnapshot::new();
        let settings = SettingsHandle::new(Settings::default());
        let stats = Arc::new(std::sync::Mutex::new(SessionStats::new()));
        let detector = FixedDetector {
            rect: Rect::new(100.0, 100.0, 50.0, 80.0),
        };
        let mut producer = Producer::new(sampler(800, 800), Box::new(detector), settings.clone(), shared.clone())
            .with_metrics(Box::new(Arc::clone(&stats)));

        producer.step().unwrap();
        let first = shared.latest();
        assert_eq!(first.tracks.len(), 1);
        let id = first.tracks[0].track_id;

        producer.step().unwrap();
        let second = shared.latest();
        assert_eq!(second.tracks[0].track_id, id);
        assert_eq!(stats.lock().unwrap().frames(), 2);

        // 关闭检测: 发布空结果, 跟踪器不更新
        settings.update(|s| s.detection_enabled = false);
        producer.step().unwrap();
        assert!(shared.latest().tracks.is_empty());
        assert_eq!(producer.tracker().track_count(), 1);
    }

    #[test]
    fn test_run_stops_on_flag() {
        let shared = SharedSnapshot::new();
        let settings = SettingsHandle::new(Settings {
            target_fps: 200,
            sample_size: 32,
            ..Settings::default()
        });
        let mut producer = Producer::new(sampler(64, 64), Box::new(Detector::new()), settings, shared);
        let stop = AtomicBool::new(true);
        producer.run(&stop);
        assert_eq!(producer.frame(), 0);
    }
}
