//! 桌面捕获模块
//!
//! FFmpeg 屏幕抓取 (Windows: gdigrab, Linux: x11grab) 在后台线程运行,
//! 滤镜把每帧 32 位 BGRA/BGR0 画面转换为 RGBA 存入共享槽, `grab()` 取最新一帧.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use image::RgbaImage;

use super::display::Display;
use crate::join_timeout;

/// 首帧等待时间
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(3);
/// 停止时等待抓屏线程的上限 (FFmpeg 卡住时不再等待)
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

type FrameSlot = Arc<Mutex<Option<RgbaImage>>>;

/// 抓屏滤镜: 32位像素帧 → RGBA
struct GrabFilter {
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    frames: u64,
}

impl FrameFilter for GrabFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::info!("✅ 桌面捕获线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(String::from("desktop capture stopped"));
        }

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as usize;
            let h = (*frame.as_ptr()).height as usize;
            let plane = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0] as usize;
            if w == 0 || h == 0 || plane.is_null() || stride < w * 4 {
                return Ok(None);
            }

            let mut rgba = vec![255u8; w * h * 4];
            for y in 0..h {
                let row = std::slice::from_raw_parts(plane.add(y * stride), w * 4);
                let out = &mut rgba[y * w * 4..(y + 1) * w * 4];
                for (src, dst) in row.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
                    dst[0] = src[2]; // R
                    dst[1] = src[1]; // G
                    dst[2] = src[0]; // B
                }
            }

            if let Some(image) = RgbaImage::from_raw(w as u32, h as u32, rgba) {
                *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
            }
        }

        self.frames += 1;
        if self.frames == 1 {
            tracing::info!("🖥️ 收到首帧桌面画面");
        }
        Ok(Some(frame))
    }
}

/// 主显示器 (FFmpeg 抓屏)
pub struct MonitorDisplay {
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MonitorDisplay {
    /// 启动抓屏线程
    pub fn open() -> Result<Self> {
        let (format, input_name) = if cfg!(target_os = "windows") {
            ("gdigrab", "desktop")
        } else if cfg!(target_os = "linux") {
            ("x11grab", ":0.0")
        } else {
            bail!("桌面捕获目前仅支持 Windows/Linux");
        };

        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let filter = GrabFilter {
            slot: Arc::clone(&slot),
            stop: Arc::clone(&stop),
            frames: 0,
        };

        let worker = std::thread::Builder::new()
            .name(String::from("desktop-grab"))
            .spawn(move || {
                if let Err(e) = run_grab(format, input_name, filter) {
                    tracing::error!("❌ 桌面捕获失败 ({}): {}", format, e);
                }
            })?;

        let mut display = Self {
            slot,
            stop,
            worker: Some(worker),
        };

        // 等待首帧, 之后 size() 才有意义
        let start = Instant::now();
        while display.latest().is_none() {
            if start.elapsed() > FIRST_FRAME_TIMEOUT || display.worker_finished() {
                display.shutdown();
                bail!("桌面捕获在 {:?} 内没有产生画面", FIRST_FRAME_TIMEOUT);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(display)
    }

    fn latest(&self) -> Option<RgbaImage> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn worker_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// 滤镜在下一帧检测到停止标志后退出 FFmpeg 循环; 没有新帧时超时分离线程
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            match join_timeout(worker, JOIN_TIMEOUT) {
                Some(Ok(())) => {}
                Some(Err(_)) => tracing::warn!("⚠️ 桌面捕获线程异常退出"),
                None => tracing::warn!("⚠️ 桌面捕获线程 {:?} 内未退出, 已分离", JOIN_TIMEOUT),
            }
        }
    }
}

fn run_grab(format: &str, input_name: &str, filter: GrabFilter) -> Result<(), String> {
    tracing::info!("🔍 尝试: format={}, input={}", format, input_name);

    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("grab", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let input = Input::new(input_name)
        .set_format(format)
        .set_input_opts([("framerate", "60"), ("draw_mouse", "0")].into());

    let ctx = FfmpegContext::builder()
        .input(input)
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    tracing::info!("✅ 桌面捕获连接成功 ({})", format);

    let _ = sch.wait();
    tracing::info!("🖥️ 桌面捕获循环结束");
    Ok(())
}

impl Display for MonitorDisplay {
    fn size(&self) -> (u32, u32) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or((0, 0), |img| img.dimensions())
    }

    fn grab(&mut self) -> Result<RgbaImage> {
        match self.latest() {
            Some(image) => Ok(image),
            None => bail!("桌面捕获没有可用画面"),
        }
    }
}

impl Drop for MonitorDisplay {
    fn drop(&mut self) {
        self.shutdown();
    }
}
