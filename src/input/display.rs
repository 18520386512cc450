//! 显示源抽象
//!
//! 采样器只依赖 `Display`: 实时桌面 (desktop 功能) 或固定图像 (离线运行/测试)

use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;

/// 可被采样的显示源
pub trait Display: Send {
    /// 当前显示尺寸 (宽, 高)
    fn size(&self) -> (u32, u32);

    /// 抓取一帧完整画面 (RGBA)
    fn grab(&mut self) -> Result<RgbaImage>;
}

/// 固定图像显示源
pub struct StillImageDisplay {
    image: RgbaImage,
}

impl StillImageDisplay {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// 从图像文件加载
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("无法打开图像: {}", path.display()))?
            .to_rgba8();
        tracing::info!(
            "🖼️ 图像源: {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self { image })
    }
}

impl Display for StillImageDisplay {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn grab(&mut self) -> Result<RgbaImage> {
        Ok(self.image.clone())
    }
}
