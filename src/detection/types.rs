/// 检测/跟踪系统数据结构定义
/// Data structures shared by detector, tracker and renderer

// ========== 几何类型 ==========

/// 二维向量 (速度, 位移)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn scale(&self, k: f32) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

/// 轴对齐矩形 (左上角 + 宽高, 像素坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 由中心点和宽高构造
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// 平移 (不改变尺寸)
    pub fn translate(&self, offset: Vec2) -> Rect {
        Rect::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let l = self.x.max(other.x);
        let r = self.right().min(other.right());
        let t = self.y.max(other.y);
        let b = self.bottom().min(other.bottom());
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    /// 计算IOU (Intersection over Union)
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

// ========== 检测结果 ==========

/// 单帧检测结果 (Detector输出, 生成后不可变)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// 采样图像坐标系下的边界框
    pub rect: Rect,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn new(rect: Rect, confidence: f32, class_id: usize, label: impl Into<String>) -> Self {
        Self {
            rect,
            confidence,
            class_id,
            label: label.into(),
        }
    }
}

/// 跟踪对象 (Tracker对外的只读视图)
///
/// 位置为平滑后的边界框, 附带速度与跟踪ID
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub rect: Rect,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
    /// 平滑速度 (像素/秒)
    pub velocity: Vec2,
    /// 唯一跟踪ID
    pub track_id: u64,
}

impl TrackedObject {
    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 0.0, 10.0, 10.0);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_center() {
        let r = Rect::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(r, Rect::new(40.0, 35.0, 20.0, 10.0));
        assert_eq!(r.center(), Vec2::new(50.0, 40.0));
        assert_eq!(r.bottom(), 45.0);
    }
}
