//! YOLO 输出解码 + NMS
//!
//! 输出格式: [1, 4 + C, A]
//! - 前4行: cx, cy, w, h (像素或归一化)
//! - 后C行: 每个类别的分数

use ndarray::{s, ArrayViewD, Axis, Ix2};

use super::letterbox::Letterbox;
use super::types::Rect;

const CXYWH_OFFSET: usize = 4;

/// 解码后的候选框 (原图坐标)
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub rect: Rect,
    pub confidence: f32,
    pub class_id: usize,
}

/// 解码网络原始输出
///
/// 返回置信度超过阈值的候选框, 坐标已经还原到 letterbox 之前的原图
pub fn decode(output: ArrayViewD<'_, f32>, letterbox: &Letterbox, conf_threshold: f32) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[1] <= CXYWH_OFFSET {
        tracing::warn!("⚠️ 非预期的输出形状: {:?}", shape);
        return candidates;
    }

    let preds = match output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("⚠️ 输出维度转换失败: {}", e);
            return candidates;
        }
    };

    let (input_w, input_h) = (letterbox.target_width as f32, letterbox.target_height as f32);

    for pred in preds.axis_iter(Axis(1)) {
        let clss = pred.slice(s![CXYWH_OFFSET..]);
        let Some((class_id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        // NaN 分数同样被拒绝
        if confidence.is_nan() || confidence <= conf_threshold {
            continue;
        }

        let (mut cx, mut cy, mut w, mut h) = (pred[0], pred[1], pred[2], pred[3]);

        // 自动识别归一化坐标
        let normalized = cx < 1.0 && cy < 1.0 && w < 1.0 && h < 1.0;
        if normalized {
            cx *= input_w;
            cy *= input_h;
            w *= input_w;
            h *= input_h;
        }

        let rect = letterbox.inverse(&Rect::from_center(cx, cy, w, h));
        candidates.push(Candidate {
            rect,
            confidence,
            class_id,
        });
    }

    candidates
}

/// 非极大值抑制 (类别无关)
///
/// 按置信度降序(稳定排序, 同分保持插入顺序), 与已保留框IOU超过阈值的框被丢弃
pub fn non_max_suppression(xs: &mut Vec<Candidate>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].rect.iou(&xs[index].rect);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
