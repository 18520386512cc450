//! 屏幕区域采样器
//!
//! 抓取显示源 → 裁剪 + 缩放 (一次 fast_image_resize 调用) → RGB 采样图

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;

use super::display::Display;

/// 采样质量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleQuality {
    /// 最近邻 (最快)
    Fast,
    /// 卷积滤波 (Catmull-Rom)
    #[default]
    Smooth,
}

impl SampleQuality {
    fn resize_alg(self) -> fr::ResizeAlg {
        match self {
            SampleQuality::Fast => fr::ResizeAlg::Nearest,
            SampleQuality::Smooth => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        }
    }
}

/// 显示坐标系下的采样区域
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// 裁剪到显示范围内: 宽高至少1像素且不超过显示尺寸, 原点回退保证区域完整
    pub fn clamped(x: i64, y: i64, width: i64, height: i64, display: (u32, u32)) -> Self {
        let (dw, dh) = (display.0.max(1) as i64, display.1.max(1) as i64);
        let width = width.clamp(1, dw);
        let height = height.clamp(1, dh);
        let x = x.max(0).min(dw - width);
        let y = y.max(0).min(dh - height);
        Self {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        }
    }
}

pub struct RegionSampler {
    display: Box<dyn Display>,
    output_width: u32,
    output_height: u32,
    region: CaptureRegion,
    quality: SampleQuality,
    resizer: fr::Resizer,
    /// RGBA 中转缓冲 (按需分配, 尺寸不变时复用)
    staging: Option<fr::images::Image<'static>>,
    allocations: u64,
}

impl RegionSampler {
    /// 默认采样整个显示源
    pub fn new(display: Box<dyn Display>) -> Self {
        let (w, h) = display.size();
        let region = CaptureRegion::clamped(0, 0, w as i64, h as i64, (w, h));
        Self {
            display,
            output_width: region.width,
            output_height: region.height,
            region,
            quality: SampleQuality::default(),
            resizer: fr::Resizer::new(),
            staging: None,
            allocations: 0,
        }
    }

    /// 设置输出尺寸
    pub fn configure(&mut self, output_width: u32, output_height: u32) {
        self.output_width = output_width.max(1);
        self.output_height = output_height.max(1);
    }

    /// 设置采样区域 (显示坐标)
    pub fn set_region(&mut self, x: i64, y: i64, width: i64, height: i64) {
        self.region = CaptureRegion::clamped(x, y, width, height, self.display.size());
    }

    pub fn set_quality(&mut self, quality: SampleQuality) {
        self.quality = quality;
    }

    pub fn region(&self) -> CaptureRegion {
        self.region
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display.size()
    }

    /// 中转缓冲分配次数
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// 采样一帧
    pub fn capture(&mut self) -> Result<RgbImage> {
        let frame = self.display.grab().context("抓取显示画面失败")?;
        let (dw, dh) = frame.dimensions();

        // 显示尺寸可能在两次调用之间变化
        let r = self.region;
        self.region = CaptureRegion::clamped(
            r.x as i64,
            r.y as i64,
            r.width as i64,
            r.height as i64,
            (dw, dh),
        );
        let r = self.region;

        let src = fr::images::ImageRef::new(dw, dh, frame.as_raw(), fr::PixelType::U8x4)
            .context("源图像缓冲无效")?;

        let (ow, oh) = (self.output_width, self.output_height);
        let reuse = self
            .staging
            .as_ref()
            .is_some_and(|s| s.width() == ow && s.height() == oh);
        if !reuse {
            self.staging = Some(fr::images::Image::new(ow, oh, fr::PixelType::U8x4));
            self.allocations += 1;
            tracing::debug!("采样缓冲分配: {}x{} (第{}次)", ow, oh, self.allocations);
        }
        let Some(dst) = self.staging.as_mut() else {
            anyhow::bail!("采样缓冲不可用");
        };

        let options = fr::ResizeOptions::new()
            .resize_alg(self.quality.resize_alg())
            .crop(r.x as f64, r.y as f64, r.width as f64, r.height as f64);
        self.resizer
            .resize(&src, dst, &options)
            .context("区域缩放失败")?;

        // RGBA → RGB
        let mut rgb = Vec::with_capacity((ow * oh * 3) as usize);
        for chunk in dst.buffer().chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..3]);
        }
        RgbImage::from_raw(ow, oh, rgb).context("RGB图像转换失败")
    }
}
