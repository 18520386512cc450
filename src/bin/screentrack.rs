/// screentrack - 屏幕区域检测 + 跟踪
///
/// 系统架构:
/// 1. 采集线程: 区域采样 → 检测 → 跟踪 → 发布快照 (独立工作线程)
/// 2. 主线程:   按渲染帧率读取快照 → 延迟补偿 → 优先目标 → 叠加层数据
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{debug, error, info, warn};

use screentrack::input::{Display, RegionSampler, StillImageDisplay};
use screentrack::pipeline::{Consumer, Pipeline, Producer, ScreenMapper, SessionStats, SharedSnapshot};
use screentrack::{init_logging, preview, Args, Detector, Settings, SettingsHandle};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn open_display(args: &Args) -> Result<Box<dyn Display>> {
    if let Some(path) = &args.image {
        return Ok(Box::new(StillImageDisplay::open(path)?));
    }

    #[cfg(feature = "desktop")]
    {
        Ok(Box::new(screentrack::input::MonitorDisplay::open()?))
    }

    #[cfg(not(feature = "desktop"))]
    {
        anyhow::bail!("未启用 desktop 功能, 请用 --image 指定图像源")
    }
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!("🚀 screentrack 启动");
    let settings = Settings::load(&args.settings);
    settings.print_summary();
    let handle = SettingsHandle::new(settings);
    if args.preview_dir.is_some() {
        handle.update(|s| s.share_preview = true);
    }

    // 1. 显示源
    let display = open_display(&args)?;
    let screen = display.size();
    info!("🖥️ 显示尺寸: {}x{}", screen.0, screen.1);
    let sampler = RegionSampler::new(display);

    // 2. 检测器
    let mut detector = Detector::new();
    match &args.model {
        Some(model) => match detector.load_model(model, args.gpu, args.threads()) {
            Ok(()) => {
                if let Some((w, h)) = detector.fixed_resolution() {
                    info!("📐 模型固定输入尺寸: {}x{}", w, h);
                }
            }
            Err(e) => error!("❌ {}", e),
        },
        None => warn!("⚠️ 未指定模型, 检测禁用"),
    }
    if let Some(labels) = &args.labels {
        match detector.load_labels(labels) {
            Ok(n) => info!("🏷️ 已加载 {} 个类别名称", n),
            Err(e) => warn!("⚠️ {}", e),
        }
    }

    // 3. 启动采集线程
    let stats = Arc::new(Mutex::new(SessionStats::new()));
    let shared = SharedSnapshot::new();
    let producer = Producer::new(sampler, Box::new(detector), handle.clone(), shared.clone())
        .with_metrics(Box::new(Arc::clone(&stats)));
    let pipeline = Pipeline::start(producer)?;
    let consumer = Consumer::new(shared, handle.clone());

    // 4. Ctrl+C
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        warn!("⚠️ 无法注册 Ctrl+C 处理: {}", e);
    }

    // 5. 渲染循环
    let ticker = crossbeam_channel::tick(Duration::from_secs_f64(
        1.0 / args.render_fps.max(1) as f64,
    ));
    let deadline = args.deadline(Instant::now());
    let mut rendered = 0u64;
    let mut last_log = Instant::now();
    let mut last_preview = 0u64;

    loop {
        crossbeam_channel::select! {
            recv(shutdown_rx) -> _ => {
                info!("🛑 收到 Ctrl+C, 准备退出");
                break;
            }
            recv(ticker) -> msg => {
                let Ok(now) = msg else { break };
                let frame = consumer.prepare(now);
                rendered += 1;

                let elapsed = now.saturating_duration_since(last_log);
                if elapsed >= Duration::from_secs(1) {
                    let settings = handle.snapshot();
                    let mapper = ScreenMapper::for_frame(&frame, screen);
                    let overlay = mapper.overlay(&frame, &settings);

                    info!(
                        "🖼️ 渲染: {:.1}fps | 快照#{} | {}个目标 | 延迟 {:.1}ms",
                        rendered as f64 / elapsed.as_secs_f64(),
                        frame.frame,
                        overlay.len(),
                        frame.latency.as_secs_f64() * 1000.0
                    );
                    for b in &overlay {
                        debug!(
                            "  #{} {}{} @ ({:.0}, {:.0}, {:.0}x{:.0})",
                            b.track_id,
                            b.caption,
                            if b.highlighted { " ★" } else { "" },
                            b.rect.x,
                            b.rect.y,
                            b.rect.width,
                            b.rect.height
                        );
                    }
                    if let Some(line) = mapper.tracer(&frame) {
                        debug!("  指示线: {:.0}px, {:.0}°", line.distance_px, line.angle_deg);
                    }

                    if let (Some(dir), Some(image)) = (&args.preview_dir, &frame.image) {
                        if frame.frame != last_preview {
                            match preview::save(dir, image, &frame) {
                                Ok(path) => debug!("💾 预览: {}", path.display()),
                                Err(e) => warn!("⚠️ {:#}", e),
                            }
                            last_preview = frame.frame;
                        }
                    }

                    rendered = 0;
                    last_log = now;
                }

                if deadline.is_some_and(|d| now >= d) {
                    info!("⏱️ 到达运行时长");
                    break;
                }
            }
        }
    }

    // 6. 停止采集线程后再释放资源
    let producer = pipeline.stop()?;
    info!("✅ 采集线程已退出 (共 {} 帧)", producer.frame());
    drop(producer);

    let stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
    info!("📊 会话统计: {}", stats.summary());
    Ok(())
}
