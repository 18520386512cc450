/// 跟踪系统 (Tracking System)
///
/// - Tracker:   贪心运动补偿跟踪 (采集线程)
/// - Predictor: 渲染延迟补偿 (渲染线程)
/// - Priority:  优先目标选择 + 距离估计
pub mod predictor;
pub mod priority;
pub mod tracker;

pub use predictor::Predictor;
pub use priority::{estimate_distance, DistanceEstimator, PriorityMode, PrioritySelector};
pub use tracker::Tracker;
