//! 标注预览图 (调试输出)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::gen_time_string;
use crate::pipeline::RenderFrame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const SELECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// 在采样图上画出轨迹框, 优先目标画红框并连线到图像中心
pub fn annotate(image: &RgbImage, frame: &RenderFrame) -> RgbImage {
    let mut img = image.clone();
    let (w, h) = img.dimensions();

    for (i, t) in frame.tracks.iter().enumerate() {
        let selected = frame.selected == Some(i);
        let color = if selected { SELECTED_COLOR } else { BOX_COLOR };
        let rect = Rect::at(t.rect.x as i32, t.rect.y as i32)
            .of_size((t.rect.width as u32).max(1), (t.rect.height as u32).max(1));
        draw_hollow_rect_mut(&mut img, rect, color);

        if selected {
            let c = t.rect.center();
            draw_line_segment_mut(&mut img, (w as f32 / 2.0, h as f32 / 2.0), (c.x, c.y), color);
        }
    }
    img
}

/// 保存带时间戳的预览图, 返回文件路径
pub fn save(dir: impl AsRef<Path>, image: &RgbImage, frame: &RenderFrame) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("无法创建目录: {}", dir.display()))?;
    let path = dir.join(format!("preview_{}_{}.png", frame.frame, gen_time_string("-")));
    annotate(image, frame)
        .save(&path)
        .with_context(|| format!("保存预览失败: {}", path.display()))?;
    Ok(path)
}
