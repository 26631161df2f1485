// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model/nms.rs - 按类别的非极大值抑制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::model::{BBox, Detection};

/// 两个 `(x, y, width, height)` 框的交并比，不相交时为 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let left = a.x.max(b.x);
  let top = a.y.max(b.y);
  let right = a.right().min(b.right());
  let bottom = a.bottom().min(b.bottom());

  if right < left || bottom < top {
    return 0.0;
  }

  let intersection = (right - left) * (bottom - top);
  let union = a.area() + b.area() - intersection;
  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 非极大值抑制
///
/// 按置信度降序处理，候选框与已保留的**同类别**框的 IoU 超过 `threshold` 时丢弃。
/// 不同类别的框互不抑制（例如右手框内的右手拇指框）。
/// 返回结果按置信度降序排列。
pub fn non_maximum_suppression(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
  for candidate in detections {
    let suppressed = kept
      .iter()
      .filter(|k| k.class_id == candidate.class_id)
      .any(|k| iou(&k.bbox, &candidate.bbox) > threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(x: f32, y: f32, width: f32, height: f32) -> BBox {
    BBox {
      x,
      y,
      width,
      height,
    }
  }

  fn detection(class_id: u32, label: &str, confidence: f32, bbox: BBox) -> Detection {
    Detection {
      class_id,
      label: label.to_string(),
      confidence,
      bbox,
    }
  }

  #[test]
  fn test_iou_basic_properties() {
    let a = bbox(0.125, 0.125, 0.5, 0.5);
    let b = bbox(0.25, 0.375, 0.5, 0.25);
    let far = bbox(0.75, 0.75, 0.125, 0.125);

    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &far), 0.0);
    assert_eq!(iou(&a, &b), iou(&b, &a));
    assert!(iou(&a, &b) > 0.0 && iou(&a, &b) < 1.0);
  }

  #[test]
  fn test_iou_degenerate_boxes() {
    let point = bbox(0.5, 0.5, 0.0, 0.0);
    assert_eq!(iou(&point, &point), 0.0);
    // 仅共享一条边
    assert_eq!(iou(&bbox(0.0, 0.0, 0.5, 0.5), &bbox(0.5, 0.0, 0.5, 0.5)), 0.0);
  }

  #[test]
  fn test_same_class_duplicate_is_suppressed() {
    // 两个 0.5 见方的框，水平错开 3/34 使 IoU = 0.7
    let shift = 0.5 * 3.0 / 17.0;
    let a = detection(0, "saung_instrument", 0.6, bbox(0.1 + shift, 0.2, 0.5, 0.5));
    let b = detection(0, "saung_instrument", 0.9, bbox(0.1, 0.2, 0.5, 0.5));
    assert!((iou(&a.bbox, &b.bbox) - 0.7).abs() < 1e-4);

    let kept = non_maximum_suppression(vec![a, b.clone()], 0.45);
    assert_eq!(kept, vec![b]);
  }

  #[test]
  fn test_different_classes_never_suppress() {
    let hand = detection(2, "right_hand", 0.95, bbox(0.2, 0.2, 0.4, 0.4));
    let thumb = detection(4, "right_thumb", 0.9, bbox(0.3, 0.3, 0.1, 0.1));
    let same_box = detection(1, "left_hand", 0.5, bbox(0.2, 0.2, 0.4, 0.4));

    let kept = non_maximum_suppression(vec![thumb.clone(), same_box.clone(), hand.clone()], 0.45);
    assert_eq!(kept, vec![hand, thumb, same_box]);
  }

  #[test]
  fn test_low_overlap_is_kept() {
    let a = detection(0, "saung_instrument", 0.9, bbox(0.0, 0.0, 0.4, 0.4));
    let b = detection(0, "saung_instrument", 0.8, bbox(0.3, 0.3, 0.4, 0.4));
    assert!(iou(&a.bbox, &b.bbox) < 0.45);

    let kept = non_maximum_suppression(vec![b, a], 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].confidence, 0.9);
  }

  #[test]
  fn test_is_idempotent() {
    let mut detections = Vec::new();
    for i in 0..12 {
      let offset = i as f32 * 0.03;
      detections.push(detection(
        (i % 3) as u32,
        "any",
        0.3 + i as f32 * 0.05,
        bbox(offset, offset / 2.0, 0.3, 0.3),
      ));
    }

    let once = non_maximum_suppression(detections, 0.45);
    let twice = non_maximum_suppression(once.clone(), 0.45);
    assert_eq!(once, twice);
    assert!(!once.is_empty());
  }

  #[test]
  fn test_empty_input() {
    assert!(non_maximum_suppression(Vec::new(), 0.45).is_empty());
  }
}
