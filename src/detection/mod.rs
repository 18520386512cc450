/// 检测系统 (Detection System)
///
/// 在采集线程中同步调用, 负责单帧目标检测
/// - Letterbox:   保持长宽比的预处理与坐标反变换
/// - Detector:    ONNX Runtime 推理
/// - Postprocess: YOLO 输出解码 + NMS
/// - Labels:      类别名称映射
pub mod detector;
pub mod labels;
pub mod letterbox;
pub mod postprocess;
pub mod types;

pub use detector::{Detector, DetectorError, ObjectDetector};
pub use labels::LabelMap;
pub use letterbox::Letterbox;
pub use types::{Detection, Rect, TrackedObject, Vec2};
