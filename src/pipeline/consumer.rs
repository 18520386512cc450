//! 渲染线程侧 (Consumer)
//! 职责: 读取最新快照 → 延迟补偿 → 优先目标选择 → 屏幕坐标映射

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;

use super::snapshot::SharedSnapshot;
use crate::config::{Settings, SettingsHandle};
use crate::detection::types::{Rect, TrackedObject, Vec2};
use crate::tracking::{DistanceEstimator, Predictor, PrioritySelector};

/// 一帧渲染所需的全部数据
#[derive(Clone, Debug)]
pub struct RenderFrame {
    /// 已做延迟补偿的轨迹 (采样坐标)
    pub tracks: Vec<TrackedObject>,
    /// 优先目标下标
    pub selected: Option<usize>,
    /// 采样时刻到渲染时刻的延迟
    pub latency: Duration,
    pub sample_width: u32,
    pub sample_height: u32,
    pub region_width: u32,
    pub region_height: u32,
    pub frame: u64,
    pub image: Option<Arc<RgbImage>>,
}

pub struct Consumer {
    shared: SharedSnapshot,
    settings: SettingsHandle,
}

impl Consumer {
    pub fn new(shared: SharedSnapshot, settings: SettingsHandle) -> Self {
        Self { shared, settings }
    }

    pub fn prepare(&self, now: Instant) -> RenderFrame {
        let snapshot = self.shared.latest();
        let settings = self.settings.snapshot();

        let latency = now.saturating_duration_since(snapshot.captured_at);
        let predictor = Predictor::new(settings.prediction_enabled, settings.prediction_gain);
        let tracks = predictor.predict(&snapshot.tracks, latency.as_secs_f32());

        let selector = PrioritySelector::new(settings.priority_enabled, settings.priority_mode);
        let selected =
            selector.select_closest(&tracks, snapshot.sample_width, snapshot.sample_height);

        RenderFrame {
            tracks,
            selected,
            latency,
            sample_width: snapshot.sample_width,
            sample_height: snapshot.sample_height,
            region_width: snapshot.region_width,
            region_height: snapshot.region_height,
            frame: snapshot.frame,
            image: snapshot.image,
        }
    }
}

// ========== 屏幕坐标映射 ==========

/// 屏幕上要绘制的框
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub rect: Rect,
    pub caption: String,
    pub highlighted: bool,
    pub track_id: u64,
}

/// 屏幕中心 → 目标的指示线
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TracerLine {
    pub from: Vec2,
    pub to: Vec2,
    pub distance_px: f32,
    /// atan2(dy, dx), 单位: 度
    pub angle_deg: f32,
}

/// 采样坐标 → 屏幕坐标 (采样区域居中于屏幕)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenMapper {
    pub screen_width: u32,
    pub screen_height: u32,
    pub offset: Vec2,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl ScreenMapper {
    pub fn new(screen: (u32, u32), region: (u32, u32), sample: (u32, u32)) -> Self {
        let (sw, sh) = (screen.0 as f32, screen.1 as f32);
        let (rw, rh) = (region.0 as f32, region.1 as f32);
        Self {
            screen_width: screen.0,
            screen_height: screen.1,
            offset: Vec2::new(sw / 2.0 - rw / 2.0, sh / 2.0 - rh / 2.0),
            scale_x: rw / sample.0.max(1) as f32,
            scale_y: rh / sample.1.max(1) as f32,
        }
    }

    pub fn for_frame(frame: &RenderFrame, screen: (u32, u32)) -> Self {
        Self::new(
            screen,
            (frame.region_width, frame.region_height),
            (frame.sample_width, frame.sample_height),
        )
    }

    pub fn map_rect(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x * self.scale_x + self.offset.x,
            rect.y * self.scale_y + self.offset.y,
            rect.width * self.scale_x,
            rect.height * self.scale_y,
        )
    }

    pub fn screen_center(&self) -> Vec2 {
        Vec2::new(self.screen_width as f32 / 2.0, self.screen_height as f32 / 2.0)
    }

    /// 生成叠加层绘制数据
    pub fn overlay(&self, frame: &RenderFrame, settings: &Settings) -> Vec<OverlayBox> {
        let distance = DistanceEstimator::new(settings.distance_enabled, settings.distance_scale);
        frame
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let rect = self.map_rect(&t.rect);
                let mut caption = String::new();
                if settings.show_name {
                    caption.push_str(&t.label);
                }
                caption.push_str(&distance.tag(rect.height));
                if settings.show_conf {
                    caption.push_str(&format!(" ({}%)", (t.confidence * 100.0) as i32));
                }
                OverlayBox {
                    rect,
                    caption,
                    highlighted: frame.selected == Some(i),
                    track_id: t.track_id,
                }
            })
            .collect()
    }

    /// 指示线: 优先目标, 没有时取离屏幕中心最近的目标
    pub fn tracer(&self, frame: &RenderFrame) -> Option<TracerLine> {
        let center = self.screen_center();
        let target = match frame.selected.and_then(|i| frame.tracks.get(i)) {
            Some(t) => self.map_rect(&t.rect).center(),
            None => frame
                .tracks
                .iter()
                .map(|t| self.map_rect(&t.rect).center())
                .min_by(|a, b| (*a - center).norm().total_cmp(&(*b - center).norm()))?,
        };

        let d = target - center;
        Some(TracerLine {
            from: center,
            to: target,
            distance_px: d.norm(),
            angle_deg: d.y.atan2(d.x).to_degrees(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::snapshot::Snapshot;
    use crate::tracking::PriorityMode;

    fn track(id: u64, rect: Rect, velocity: Vec2) -> TrackedObject {
        TrackedObject {
            rect,
            confidence: 0.87,
            class_id: 0,
            label: String::from("bottle"),
            velocity,
            track_id: id,
        }
    }

    fn frame(tracks: Vec<TrackedObject>, selected: Option<usize>) -> RenderFrame {
        RenderFrame {
            tracks,
            selected,
            latency: Duration::ZERO,
            sample_width: 640,
            sample_height: 640,
            region_width: 1280,
            region_height: 1280,
            frame: 1,
            image: None,
        }
    }

    #[test]
    fn test_prepare_predicts_and_selects() {
        let shared = SharedSnapshot::new();
        let settings = SettingsHandle::new(Settings {
            priority_enabled: true,
            priority_mode: PriorityMode::Largest,
            ..Settings::default()
        });
        let captured_at = Instant::now();
        shared.publish(Snapshot {
            tracks: vec![
                track(1, Rect::new(0.0, 0.0, 10.0, 10.0), Vec2::ZERO),
                track(2, Rect::new(100.0, 100.0, 20.0, 40.0), Vec2::new(100.0, 0.0)),
            ],
            sample_width: 640,
            sample_height: 640,
            region_width: 640,
            region_height: 640,
            captured_at,
            frame: 5,
            image: None,
        });

        let consumer = Consumer::new(shared, settings.clone());
        let out = consumer.prepare(captured_at + Duration::from_millis(100));
        assert_eq!(out.frame, 5);
        assert_eq!(out.selected, Some(1));
        assert!((out.tracks[1].rect.x - 110.0).abs() < 1e-3);
        assert_eq!(out.tracks[0].rect.x, 0.0);

        settings.update(|s| s.prediction_enabled = false);
        let out = consumer.prepare(captured_at + Duration::from_millis(100));
        assert_eq!(out.tracks[1].rect.x, 100.0);
    }

    #[test]
    fn test_mapper_scales_and_centers() {
        let mapper = ScreenMapper::new((1920, 1080), (1280, 1280), (640, 640));
        assert_eq!(mapper.offset, Vec2::new(320.0, -100.0));
        let r = mapper.map_rect(&Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(r, Rect::new(340.0, -60.0, 60.0, 80.0));
    }

    #[test]
    fn test_overlay_captions() {
        let f = frame(vec![track(3, Rect::new(0.0, 0.0, 10.0, 50.0), Vec2::ZERO)], Some(0));
        let mapper = ScreenMapper::for_frame(&f, (1920, 1080));
        let settings = Settings {
            distance_enabled: true,
            ..Settings::default()
        };
        let boxes = mapper.overlay(&f, &settings);
        // 屏幕高度 100px → 10m
        assert_eq!(boxes[0].caption, "bottle [10m] (87%)");
        assert!(boxes[0].highlighted);
        assert_eq!(boxes[0].track_id, 3);

        let settings = Settings {
            show_name: false,
            show_conf: false,
            ..Settings::default()
        };
        assert_eq!(mapper.overlay(&f, &settings)[0].caption, "");
    }

    #[test]
    fn test_tracer_falls_back_to_closest() {
        // 样本与屏幕 1:1, 区域居中
        let mut f = frame(
            vec![
                track(1, Rect::new(0.0, 0.0, 10.0, 10.0), Vec2::ZERO),
                track(2, Rect::new(300.0, 200.0, 40.0, 40.0), Vec2::ZERO),
            ],
            None,
        );
        f.region_width = 640;
        f.region_height = 640;
        let mapper = ScreenMapper::for_frame(&f, (640, 640));

        let line = mapper.tracer(&f).unwrap();
        assert_eq!(line.from, Vec2::new(320.0, 320.0));
        assert_eq!(line.to, Vec2::new(320.0, 220.0));
        assert!((line.distance_px - 100.0).abs() < 1e-4);
        assert!((line.angle_deg + 90.0).abs() < 1e-4);

        f.selected = Some(0);
        let line = mapper.tracer(&f).unwrap();
        assert_eq!(line.to, Vec2::new(5.0, 5.0));

        assert!(mapper.tracer(&frame(Vec::new(), None)).is_none());
    }
}
