pub mod config; // 运行配置 (命令行 + JSON)
pub mod detection; // 目标检测
pub mod input; // 画面输入
pub mod pipeline; // 采集/渲染流水线
pub mod preview; // 标注预览
pub mod tracking; // 跟踪 + 预测 + 优先目标

pub use crate::config::{Args, Settings, SettingsHandle};
pub use crate::detection::{Detection, Detector, TrackedObject};
pub use crate::pipeline::{Consumer, Pipeline, PipelineHandle, Producer, RenderFrame};

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 限时等待线程结束
///
/// 超时返回 `None`, 线程被分离 (不再等待)
pub fn join_timeout<T>(
    worker: std::thread::JoinHandle<T>,
    timeout: std::time::Duration,
) -> Option<std::thread::Result<T>> {
    let start = std::time::Instant::now();
    while !worker.is_finished() {
        if start.elapsed() >= timeout {
            return None;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    Some(worker.join())
}

/// 初始化日志 (RUST_LOG 未设置时默认 info)
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
