//! 贪心运动补偿跟踪器
//!
//! 每帧流程:
//! 1. 按上一帧速度外推旧轨迹中心
//! 2. 同类别且中心距离 < 250px 的 (检测, 轨迹) 对作为候选
//! 3. 按距离升序贪心匹配, 每个检测/轨迹最多匹配一次
//! 4. 匹配成功: 继承ID, 更新速度与平滑框
//! 5. 未匹配检测: 新建轨迹; 未匹配轨迹: 立即丢弃 (不做外推保留)

use std::time::Instant;

use crate::detection::types::{Detection, Rect, TrackedObject, Vec2};

// ========== 跟踪参数 ==========

/// 匹配门限 (像素)
pub const MATCH_GATE: f32 = 250.0;
/// 速度上限 (像素/秒)
pub const MAX_SPEED: f32 = 2000.0;
/// 低于此速度进入摩擦模式: 原始速度减半, 平滑系数固定为 0.2
pub const FRICTION_SPEED: f32 = 50.0;
pub const FRICTION_ALPHA: f32 = 0.2;
/// 低于此速度视为静止抖动, 速度清零
pub const JITTER_SPEED: f32 = 2.0;
/// 低于此速度启用位置死区
pub const STATIC_SPEED: f32 = 15.0;
pub const POSITION_DEADZONE: f32 = 3.0;
pub const SIZE_DEADZONE: f32 = 5.0;
/// 尺寸平滑系数
pub const SIZE_ALPHA: f32 = 0.05;
/// 最小积分时间步长 (秒)
pub const MIN_DT: f32 = 1e-4;
/// 匹配成功时重置的存活计数
pub const TRACK_TTL: u32 = 10;
pub const DEFAULT_SMOOTHING: f32 = 0.6;

/// 内部轨迹状态
#[derive(Clone, Debug)]
struct Track {
    track_id: u64,
    class_id: usize,
    label: String,
    confidence: f32,
    /// 最新一次检测的原始框
    #[allow(dead_code)]
    raw: Rect,
    /// 指数平滑后的框 (亚像素)
    smoothed: Rect,
    /// 平滑速度 (像素/秒)
    velocity: Vec2,
    /// 存活计数, 匹配时重置 (不用于外推保留)
    #[allow(dead_code)]
    alive: u32,
}

impl Track {
    fn spawn(track_id: u64, detection: &Detection) -> Self {
        Self {
            track_id,
            class_id: detection.class_id,
            label: detection.label.clone(),
            confidence: detection.confidence,
            raw: detection.rect,
            smoothed: detection.rect,
            velocity: Vec2::ZERO,
            alive: TRACK_TTL,
        }
    }

    fn view(&self) -> TrackedObject {
        TrackedObject {
            rect: self.smoothed,
            confidence: self.confidence,
            class_id: self.class_id,
            label: self.label.clone(),
            velocity: self.velocity,
            track_id: self.track_id,
        }
    }
}

#[inline]
fn lerp(from: f32, to: f32, alpha: f32) -> f32 {
    from + (to - from) * alpha
}

pub struct Tracker {
    tracks: Vec<Track>,
    next_id: u64,
    smoothing_factor: f32,
    last_update: Option<Instant>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

impl Tracker {
    pub fn new(smoothing_factor: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            smoothing_factor: smoothing_factor.clamp(0.01, 1.0),
            last_update: None,
        }
    }

    /// 位置/速度平滑系数 (越大越跟手, 越小越平滑)
    pub fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoothing_factor = factor.clamp(0.01, 1.0);
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.smoothing_factor
    }

    /// 清空轨迹 (ID计数不回退)
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.last_update = None;
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// 当前轨迹的只读视图
    pub fn processed(&self) -> Vec<TrackedObject> {
        self.tracks.iter().map(Track::view).collect()
    }

    pub fn update(&mut self, detections: &[Detection]) {
        self.update_at(detections, Instant::now());
    }

    /// 以指定时刻更新 (回放/测试使用)
    pub fn update_at(&mut self, detections: &[Detection], now: Instant) {
        let dt = self
            .last_update
            .map(|t| now.saturating_duration_since(t).as_secs_f32())
            .unwrap_or(MIN_DT)
            .max(MIN_DT);
        self.last_update = Some(now);

        // 1. 运动补偿: 外推旧轨迹中心
        let predicted: Vec<Vec2> = self
            .tracks
            .iter()
            .map(|t| t.smoothed.center() + t.velocity.scale(dt))
            .collect();

        // 2. 候选对
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            let center = det.rect.center();
            for (j, track) in self.tracks.iter().enumerate() {
                if track.class_id != det.class_id {
                    continue;
                }
                let dist = (center - predicted[j]).norm();
                if dist < MATCH_GATE {
                    candidates.push((dist, i, j));
                }
            }
        }

        // 3. 贪心匹配
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];
        let mut next_tracks = Vec::with_capacity(detections.len());

        for &(_, i, j) in &candidates {
            if matched_det[i] || matched_track[j] {
                continue;
            }
            matched_det[i] = true;
            matched_track[j] = true;
            next_tracks.push(self.advance(&self.tracks[j], &detections[i], dt));
        }

        // 4. 新目标
        for (i, det) in detections.iter().enumerate() {
            if !matched_det[i] {
                next_tracks.push(Track::spawn(self.next_id, det));
                self.next_id += 1;
            }
        }

        // 5. 未匹配轨迹直接丢弃
        let dropped = matched_track.iter().filter(|m| !**m).count();
        if dropped > 0 {
            tracing::trace!("丢弃轨迹: {}", dropped);
        }

        self.tracks = next_tracks;
    }

    /// 匹配成功后的轨迹更新
    fn advance(&self, prev: &Track, det: &Detection, dt: f32) -> Track {
        let prev_center = prev.smoothed.center();
        let cur_center = det.rect.center();

        // 速度: 相对未外推的平滑中心
        let mut raw_velocity = (cur_center - prev_center).scale(1.0 / dt);
        let speed = raw_velocity.norm();
        if speed > MAX_SPEED {
            raw_velocity = raw_velocity.scale(MAX_SPEED / speed);
        }

        let mut alpha = self.smoothing_factor;
        if raw_velocity.norm() < FRICTION_SPEED {
            alpha = FRICTION_ALPHA;
            raw_velocity = raw_velocity.scale(0.5);
        }

        // 反向运动视为抖动
        if raw_velocity.dot(prev.velocity) < 0.0 {
            raw_velocity = Vec2::ZERO;
        }

        let velocity = if raw_velocity.norm() < JITTER_SPEED {
            Vec2::ZERO
        } else {
            raw_velocity.scale(alpha) + prev.velocity.scale(1.0 - alpha)
        };

        // 位置死区 (仅近似静止时)
        let mut target = det.rect;
        if velocity.norm() < STATIC_SPEED {
            if (target.x - prev.smoothed.x).abs() < POSITION_DEADZONE {
                target.x = prev.smoothed.x;
            }
            if (target.y - prev.smoothed.y).abs() < POSITION_DEADZONE {
                target.y = prev.smoothed.y;
            }
        }

        // 尺寸死区
        if (target.width - prev.smoothed.width).abs() < SIZE_DEADZONE {
            target.width = prev.smoothed.width;
        }
        if (target.height - prev.smoothed.height).abs() < SIZE_DEADZONE {
            target.height = prev.smoothed.height;
        }

        let smoothed = Rect::new(
            lerp(prev.smoothed.x, target.x, alpha),
            lerp(prev.smoothed.y, target.y, alpha),
            lerp(prev.smoothed.width, target.width, SIZE_ALPHA),
            lerp(prev.smoothed.height, target.height, SIZE_ALPHA),
        );

        Track {
            track_id: prev.track_id,
            class_id: det.class_id,
            label: det.label.clone(),
            confidence: det.confidence,
            raw: det.rect,
            smoothed,
            velocity,
            alive: TRACK_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn det(x: f32, y: f32, w: f32, h: f32, class_id: usize) -> Detection {
        Detection::new(Rect::new(x, y, w, h), 0.9, class_id, "bottle")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_slow_target_keeps_id() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(100.0, 100.0, 40.0, 40.0, 0)], t0);
        let id = tracker.processed()[0].track_id;

        for frame in 1..=10u64 {
            let x = 100.0 + frame as f32 * 5.0;
            tracker.update_at(&[det(x, 100.0, 40.0, 40.0, 0)], t0 + ms(16 * frame));
            let tracks = tracker.processed();
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].track_id, id, "frame {frame}");
        }
    }

    #[test]
    fn test_no_coasting() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(10.0, 10.0, 20.0, 20.0, 0)], t0);
        let first = tracker.processed()[0].track_id;

        tracker.update_at(&[], t0 + ms(16));
        assert!(tracker.processed().is_empty());

        tracker.update_at(&[det(10.0, 10.0, 20.0, 20.0, 0)], t0 + ms(32));
        let tracks = tracker.processed();
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].track_id > first);
    }

    #[test]
    fn test_velocity_is_capped() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        // 200px / 40ms = 5000px/s
        tracker.update_at(&[det(0.0, 300.0, 50.0, 50.0, 0)], t0);
        let id = tracker.processed()[0].track_id;
        for frame in 1..=2u64 {
            let x = 200.0 * frame as f32;
            tracker.update_at(&[det(x, 300.0, 50.0, 50.0, 0)], t0 + ms(40 * frame));
            let t = &tracker.processed()[0];
            assert_eq!(t.track_id, id);
            assert!(t.speed() > 0.0);
            assert!(t.speed() <= MAX_SPEED + 1e-3, "speed {}", t.speed());
        }
    }

    #[test]
    fn test_static_jitter_is_locked() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        let base = Rect::new(200.0, 150.0, 60.0, 80.0);
        tracker.update_at(&[Detection::new(base, 0.8, 2, "can")], t0);

        let jitter = [(2.0, -1.0), (-2.0, 1.0), (1.0, 2.0), (-1.0, -2.0), (0.0, 1.5), (1.5, 0.0)];
        for (k, (dx, dy)) in jitter.iter().enumerate() {
            let rect = Rect::new(base.x + dx, base.y + dy, base.width + dy, base.height - dx);
            let now = t0 + ms(100 * (k as u64 + 1));
            tracker.update_at(&[Detection::new(rect, 0.8, 2, "can")], now);
            let tracks = tracker.processed();
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].rect, base, "frame {k}");
            assert!(tracks[0].speed() < STATIC_SPEED);
        }
    }

    #[test]
    fn test_class_mismatch_starts_new_track() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(50.0, 50.0, 30.0, 30.0, 0)], t0);
        let first = tracker.processed()[0].track_id;
        tracker.update_at(&[det(50.0, 50.0, 30.0, 30.0, 1)], t0 + ms(16));
        let tracks = tracker.processed();
        assert_eq!(tracks.len(), 1);
        assert_ne!(tracks[0].track_id, first);
        assert_eq!(tracks[0].class_id, 1);
    }

    #[test]
    fn test_far_jump_starts_new_track() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(0.0, 0.0, 30.0, 30.0, 0)], t0);
        let first = tracker.processed()[0].track_id;
        tracker.update_at(&[det(400.0, 0.0, 30.0, 30.0, 0)], t0 + ms(16));
        let t = &tracker.processed()[0];
        assert_ne!(t.track_id, first);
        assert_eq!(t.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        let mut seen = Vec::new();
        for frame in 0..5u64 {
            // 每帧都跳到远处, 每次都是新轨迹
            let x = frame as f32 * 1000.0;
            tracker.update_at(&[det(x, 0.0, 20.0, 20.0, 0), det(x, 500.0, 20.0, 20.0, 0)], t0 + ms(16 * frame));
            for t in tracker.processed() {
                seen.push(t.track_id);
            }
        }
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");

        tracker.reset();
        tracker.update_at(&[det(0.0, 0.0, 20.0, 20.0, 0)], t0 + ms(200));
        assert!(tracker.processed()[0].track_id > *seen.last().unwrap());
    }

    #[test]
    fn test_greedy_nearest_match() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(0.0, 0.0, 20.0, 20.0, 0), det(100.0, 0.0, 20.0, 20.0, 0)], t0);
        let before = tracker.processed();
        let id_left = before.iter().find(|t| t.rect.x == 0.0).unwrap().track_id;
        let id_right = before.iter().find(|t| t.rect.x == 100.0).unwrap().track_id;

        // 两个检测都在两条轨迹的门限内, 就近分配
        tracker.update_at(&[det(90.0, 0.0, 20.0, 20.0, 0), det(10.0, 0.0, 20.0, 20.0, 0)], t0 + ms(100));
        let after = tracker.processed();
        assert_eq!(after.len(), 2);
        let left = after.iter().find(|t| t.track_id == id_left).unwrap();
        let right = after.iter().find(|t| t.track_id == id_right).unwrap();
        assert!(left.rect.center().x < right.rect.center().x);
    }

    #[test]
    fn test_first_update_has_zero_velocity() {
        let mut tracker = Tracker::new(0.3);
        tracker.update(&[det(5.0, 5.0, 10.0, 10.0, 3)]);
        let t = &tracker.processed()[0];
        assert_eq!(t.velocity, Vec2::ZERO);
        assert_eq!(t.rect, Rect::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(tracker.track_count(), 1);
    }

    #[test]
    fn test_motion_compensated_matching() {
        let mut tracker = Tracker::new(1.0);
        let t0 = Instant::now();
        tracker.update_at(&[det(0.0, 0.0, 40.0, 40.0, 0)], t0);
        tracker.update_at(&[det(150.0, 0.0, 40.0, 40.0, 0)], t0 + ms(100));
        let a = tracker.processed()[0].clone();
        assert!((a.velocity.x - 1500.0).abs() < 1.0, "v {:?}", a.velocity);

        // 外推后 A 的中心在 x=320: 远处的检测比近处的更吻合
        tracker.update_at(
            &[det(300.0, 0.0, 40.0, 40.0, 0), det(100.0, 0.0, 40.0, 40.0, 0)],
            t0 + ms(200),
        );
        let tracks = tracker.processed();
        assert_eq!(tracks.len(), 2);
        let kept = tracks.iter().find(|t| t.track_id == a.track_id).unwrap();
        assert_eq!(kept.rect.x, 300.0);
        let fresh = tracks.iter().find(|t| t.track_id != a.track_id).unwrap();
        assert_eq!(fresh.rect.x, 100.0);
        assert_eq!(fresh.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_reversal_zeroes_velocity() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        for (k, x) in [0.0, 10.0, 20.0].iter().enumerate() {
            tracker.update_at(&[det(*x, 0.0, 40.0, 40.0, 0)], t0 + ms(100 * k as u64));
        }
        let before = tracker.processed()[0].clone();
        assert!(before.velocity.x > STATIC_SPEED, "v {:?}", before.velocity);

        tracker.update_at(&[det(0.0, 0.0, 40.0, 40.0, 0)], t0 + ms(300));
        let after = &tracker.processed()[0];
        assert_eq!(after.track_id, before.track_id);
        assert_eq!(after.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_slow_motion_uses_friction() {
        let mut tracker = Tracker::default();
        let t0 = Instant::now();
        tracker.update_at(&[det(100.0, 0.0, 40.0, 40.0, 0)], t0);

        // 30px/s → 减半为15, 以0.2混合: 3px/s
        tracker.update_at(&[det(103.0, 0.0, 40.0, 40.0, 0)], t0 + ms(100));
        let t = &tracker.processed()[0];
        assert!((t.velocity.x - 3.0).abs() < 1e-3, "v {:?}", t.velocity);
        assert_eq!(t.velocity.y, 0.0);
        assert!((t.rect.x - 100.6).abs() < 1e-3, "x {}", t.rect.x);

        // 34px/s → 17, 0.2 * 17 + 0.8 * 3 = 5.8
        tracker.update_at(&[det(104.0, 0.0, 40.0, 40.0, 0)], t0 + ms(200));
        let t = &tracker.processed()[0];
        assert!((t.velocity.x - 5.8).abs() < 1e-2, "v {:?}", t.velocity);
    }
}
