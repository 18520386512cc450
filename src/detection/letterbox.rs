//! Letterbox 预处理
//!
//! 保持长宽比缩放到网络输入尺寸, 居中放在灰色(114)画布上,
//! 记录缩放比例和填充偏移, 用于把网络坐标精确映射回原图.

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use ndarray::Array4;

use super::types::Rect;

/// 填充颜色 (YOLO 训练时使用的灰色)
pub const PAD_VALUE: u8 = 114;

/// Letterbox 变换参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub ratio: f32,
    pub src_width: u32,
    pub src_height: u32,
    pub new_width: u32,
    pub new_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// 计算 src → target 的 letterbox 参数
    pub fn fit(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> Self {
        let (sw, sh) = (src_width.max(1), src_height.max(1));
        let (tw, th) = (target_width.max(1), target_height.max(1));

        let ratio = (tw as f32 / sw as f32).min(th as f32 / sh as f32);
        let new_width = ((sw as f32 * ratio) as u32).clamp(1, tw);
        let new_height = ((sh as f32 * ratio) as u32).clamp(1, th);

        Self {
            ratio,
            src_width: sw,
            src_height: sh,
            new_width,
            new_height,
            target_width: tw,
            target_height: th,
            pad_x: (tw - new_width) / 2,
            pad_y: (th - new_height) / 2,
        }
    }

    /// 原图坐标 → 网络输入坐标
    pub fn forward(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x * self.ratio + self.pad_x as f32,
            rect.y * self.ratio + self.pad_y as f32,
            rect.width * self.ratio,
            rect.height * self.ratio,
        )
    }

    /// 网络输入坐标 → 原图坐标 (裁剪到原图范围内)
    pub fn inverse(&self, rect: &Rect) -> Rect {
        let (w0, h0) = (self.src_width as f32, self.src_height as f32);

        let x = (rect.x - self.pad_x as f32) / self.ratio;
        let y = (rect.y - self.pad_y as f32) / self.ratio;
        let w = rect.width / self.ratio;
        let h = rect.height / self.ratio;

        let left = x.clamp(0.0, w0);
        let top = y.clamp(0.0, h0);
        Rect::new(
            left,
            top,
            w.min(w0 - left).max(0.0),
            h.min(h0 - top).max(0.0),
        )
    }

    /// 生成 letterbox 图像
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(
            self.target_width,
            self.target_height,
            Rgb([PAD_VALUE; 3]),
        );
        let resized = image::imageops::resize(
            image,
            self.new_width,
            self.new_height,
            FilterType::Triangle,
        );
        image::imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }
}

/// RGB图像 → NCHW 张量 [1, 3, H, W], 归一化到 [0, 1]
pub fn normalize(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, rgb) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = rgb.0;
        tensor[[0, 0, y, x]] = r as f32 / 255.0;
        tensor[[0, 1, y, x]] = g as f32 / 255.0;
        tensor[[0, 2, y, x]] = b as f32 / 255.0;
    }
    tensor
}
