/// 检测流水线 (Detection Pipeline)
///
/// 双线程架构, 通过单个互斥快照通信:
/// - Producer: 采样 + 检测 + 跟踪 (独立线程)
/// - Consumer: 延迟补偿 + 优先目标 + 坐标映射 (渲染线程)
pub mod consumer;
pub mod metrics;
pub mod producer;
pub mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

pub use consumer::{Consumer, OverlayBox, RenderFrame, ScreenMapper, TracerLine};
pub use metrics::{FrameMetrics, MetricsSink, SessionStats};
pub use producer::Producer;
pub use snapshot::{SharedSnapshot, Snapshot};

pub struct Pipeline;

impl Pipeline {
    /// 启动采集线程
    pub fn start(mut producer: Producer) -> Result<PipelineHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name(String::from("producer"))
            .spawn(move || {
                producer.run(&flag);
                producer
            })?;
        Ok(PipelineHandle {
            stop,
            worker: Some(worker),
        })
    }
}

/// 采集线程句柄
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Producer>>,
}

impl PipelineHandle {
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// 请求停止并等待线程退出 (进行中的推理会先完成), 归还 Producer
    pub fn stop(mut self) -> Result<Producer> {
        self.stop.store(true, Ordering::Relaxed);
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("采集线程已被回收"))?;
        worker.join().map_err(|_| anyhow!("采集线程异常退出"))
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
