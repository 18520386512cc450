/// 画面输入系统 (Input System)
///
/// 负责从显示源采样检测区域
/// - Display:       显示源抽象 (固定图像 / 桌面)
/// - RegionSampler: 区域裁剪 + 缩放
/// - MonitorDisplay: FFmpeg 桌面捕获 (需要 desktop 功能)
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod display;
pub mod sampler;

#[cfg(feature = "desktop")]
pub use desktop::MonitorDisplay;
pub use display::{Display, StillImageDisplay};
pub use sampler::{CaptureRegion, RegionSampler, SampleQuality};
