//! 运行配置 - 命令行参数 + 可热调整的 JSON 配置

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::tracking::PriorityMode;

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "屏幕区域检测 + 跟踪", long_about = None)]
pub struct Args {
    /// ONNX 模型路径
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 类别标签文件 ({"0": "person", ...})
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "screentrack.json")]
    pub settings: PathBuf,

    /// 使用 CUDA 推理
    #[arg(long, default_value_t = false)]
    pub gpu: bool,

    /// 推理线程数 (默认: CPU核心数)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// 以固定图像作为显示源 (不抓屏)
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// 渲染循环帧率
    #[arg(long, default_value_t = 60)]
    pub render_fps: u32,

    /// 运行时长 (秒), 不指定则运行到 Ctrl+C
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// 标注预览图输出目录
    #[arg(long)]
    pub preview_dir: Option<PathBuf>,
}

impl Args {
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8)
        })
    }

    /// 运行截止时刻 (从 `now` 起算 `--duration` 秒)
    ///
    /// 无效或超出范围的时长会被忽略, 程序运行到 Ctrl+C
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        let secs = self.duration?;
        match Duration::try_from_secs_f64(secs.max(0.0))
            .ok()
            .and_then(|d| now.checked_add(d))
        {
            Some(deadline) => Some(deadline),
            None => {
                tracing::warn!("⚠️ 忽略无效的运行时长: {}", secs);
                None
            }
        }
    }
}

/// 可在运行中调整的参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === 检测参数 ===
    pub detection_enabled: bool,
    pub conf_threshold: f32, // 置信度阈值
    pub nms_threshold: f32,  // NMS IOU阈值
    pub input_resolution: u32, // 网络输入尺寸 (320/416/512/640)
    pub target_fps: u32,     // 检测帧率上限, 0 = 不限制

    // === 采样区域 ===
    pub fov_width: u32,
    pub fov_height: u32,
    pub sample_size: u32,   // 采样输出尺寸 (正方形)
    pub fast_capture: bool, // 最近邻缩放

    // === 跟踪/预测 ===
    pub smoothing_factor: f32,
    pub prediction_enabled: bool,
    pub prediction_gain: f32,

    // === 优先目标/测距 ===
    pub priority_enabled: bool,
    pub priority_mode: PriorityMode,
    pub distance_enabled: bool,
    pub distance_scale: f32,

    // === 显示 ===
    pub show_name: bool,
    pub show_conf: bool,
    /// 在快照中附带采样图像 (预览用)
    pub share_preview: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            conf_threshold: 0.5,
            nms_threshold: 0.45,
            input_resolution: 416,
            target_fps: 0,

            fov_width: 640,
            fov_height: 640,
            sample_size: 640,
            fast_capture: true,

            smoothing_factor: 0.6,
            prediction_enabled: true,
            prediction_gain: 1.0,

            priority_enabled: false,
            priority_mode: PriorityMode::Lowest,
            distance_enabled: false,
            distance_scale: 1000.0,

            show_name: true,
            show_conf: true,
            share_preview: false,
        }
    }
}

impl Settings {
    /// 从JSON文件加载, 文件不存在时创建默认配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => {
                    tracing::info!("✅ 配置已从 {} 加载", path.display());
                    settings
                }
                Err(e) => {
                    tracing::warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("📝 配置文件不存在,创建默认配置...");
                let settings = Self::default();
                if let Err(e) = settings.save(path) {
                    tracing::error!("❌ 保存配置失败: {:#}", e);
                }
                settings
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn print_summary(&self) {
        tracing::info!("🎛️ 当前配置:");
        tracing::info!(
            "  检测: {} | 置信度: {:.2} | NMS: {:.2} | 输入: {} | 帧率上限: {}",
            self.detection_enabled,
            self.conf_threshold,
            self.nms_threshold,
            self.input_resolution,
            self.target_fps
        );
        tracing::info!(
            "  区域: {}x{} → {} | 快速采样: {}",
            self.fov_width,
            self.fov_height,
            self.sample_size,
            self.fast_capture
        );
        tracing::info!(
            "  平滑: {:.2} | 预测: {} (增益 {:.2}) | 优先: {} ({:?}) | 测距: {}",
            self.smoothing_factor,
            self.prediction_enabled,
            self.prediction_gain,
            self.priority_enabled,
            self.priority_mode,
            self.distance_enabled
        );
    }
}

/// 共享配置 (渲染/UI 写, 采集线程每帧读取一次副本)
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    inner: Arc<Mutex<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings::load(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.priority_mode = PriorityMode::Centered;
        settings.fov_width = 320;
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);

        // 缺失字段使用默认值
        fs::write(&path, r#"{"conf_threshold": 0.25, "priority_mode": "largest"}"#).unwrap();
        let loaded = Settings::load(&path);
        assert_eq!(loaded.conf_threshold, 0.25);
        assert_eq!(loaded.priority_mode, PriorityMode::Largest);
        assert_eq!(loaded.fov_height, 640);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_handle_update_visible_to_clones() {
        let handle = SettingsHandle::new(Settings::default());
        let other = handle.clone();
        other.update(|s| s.detection_enabled = false);
        assert!(!handle.snapshot().detection_enabled);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["screentrack", "-m", "model.onnx", "--gpu", "-t", "4"]);
        assert_eq!(args.model, Some(PathBuf::from("model.onnx")));
        assert!(args.gpu);
        assert_eq!(args.threads(), 4);
        assert_eq!(args.render_fps, 60);
    }

    #[test]
    fn test_deadline_from_duration() {
        let now = Instant::now();
        let args = Args::parse_from(["screentrack", "-d", "1.5"]);
        assert_eq!(args.deadline(now), Some(now + Duration::from_millis(1500)));

        let args = Args::parse_from(["screentrack", "--duration=-3"]);
        assert_eq!(args.deadline(now), Some(now));

        assert_eq!(Args::parse_from(["screentrack"]).deadline(now), None);
    }

    #[test]
    fn test_deadline_out_of_range_is_ignored() {
        let now = Instant::now();
        for value in ["inf", "1e300"] {
            let args = Args::parse_from(["screentrack", "-d", value]);
            assert_eq!(args.deadline(now), None, "{value}");
        }
    }
}
