// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model/decode.rs - 锚点解码与坐标归一化
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

use crate::model::{
  BBox,
  layout::{OBJECTNESS_INDEX, OutputLayout},
};

/// 通过置信度过滤的锚点，坐标仍是模型输入空间的中心形式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: u32,
  pub confidence: f32,
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

/// 扫描所有锚点，把 `confidence > threshold` 的追加到 `out`
///
/// `confidence = objectness * max(class_scores)`，没有 objectness 时按 1.0 计。
/// 循环内不做堆分配，`out` 可以在多轮之间复用。
pub fn decode_anchors(data: &[f32], layout: &OutputLayout, threshold: f32, out: &mut Vec<Candidate>) {
  if layout.class_slots == 0 || data.len() < layout.element_count() {
    return;
  }

  for anchor in 0..layout.num_anchors {
    let at = |attr: usize| data[layout.index(anchor, attr)];

    let objectness = if layout.has_objectness {
      at(OBJECTNESS_INDEX)
    } else {
      1.0
    };

    let mut max_score = f32::NEG_INFINITY;
    let mut class_id = 0usize;
    for c in 0..layout.class_slots {
      let score = at(layout.class_offset + c);
      if score > max_score {
        max_score = score;
        class_id = c;
      }
    }

    let confidence = objectness * max_score;
    if confidence.is_nan() || confidence <= threshold {
      continue;
    }

    out.push(Candidate {
      class_id: class_id as u32,
      confidence,
      cx: at(0),
      cy: at(1),
      w: at(2),
      h: at(3),
    });
  }
}

/// 中心形式的像素坐标转换为左上角形式的归一化坐标
///
/// 各分量先裁剪到 `[0, 1]`，裁剪后仍越界（`x + width > 1` 或 `y + height > 1`）
/// 的框视为错误预测，返回 `None`。
pub fn normalize_box(cx: f32, cy: f32, w: f32, h: f32, input_size: f32) -> Option<BBox> {
  let bbox = BBox {
    x: ((cx - w / 2.0) / input_size).clamp(0.0, 1.0),
    y: ((cy - h / 2.0) / input_size).clamp(0.0, 1.0),
    width: (w / input_size).clamp(0.0, 1.0),
    height: (h / input_size).clamp(0.0, 1.0),
  };

  if !bbox.is_finite() || bbox.right() > 1.0 || bbox.bottom() > 1.0 {
    return None;
  }
  Some(bbox)
}

impl Candidate {
  pub fn normalized(&self, input_size: f32) -> Option<BBox> {
    normalize_box(self.cx, self.cy, self.w, self.h, input_size)
  }
}
