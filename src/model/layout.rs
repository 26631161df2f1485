// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model/layout.rs - 输出张量布局判定
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

use thiserror::Error;

use crate::config::LayoutHint;

/// 每个锚点至少包含 cx, cy, w, h
pub const BOX_ATTRIBUTES: usize = 4;
pub const OBJECTNESS_INDEX: usize = 4;

/// 锚点数应远大于向量宽度，低于该倍数时认为判定不可靠
const MIN_ANCHOR_RATIO: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
  #[error("不支持的输出形状 {0:?}, 期望 [1, N, M]")]
  UnsupportedShape(Vec<usize>),
  #[error("输出形状 {shape:?} 的向量宽度 {num_vectors} 不足以容纳边界框")]
  TooNarrow { shape: Vec<usize>, num_vectors: usize },
  #[error("输出形状 {0:?} 的元素个数超出 usize 范围")]
  Overflow(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
  pub num_anchors: usize,
  pub num_vectors: usize,
  /// `[1, vectors, anchors]`，同一属性的所有锚点连续存放
  pub channel_first: bool,
  pub has_objectness: bool,
  /// 第一个类别分数所在的属性序号
  pub class_offset: usize,
  /// 实际扫描的类别分数个数
  pub class_slots: usize,
  /// 向量宽度与类别数是否对应（4 + C 或 5 + C）
  pub matched: bool,
  /// 锚点数并未明显大于向量宽度
  pub ambiguous: bool,
  element_count: usize,
}

impl OutputLayout {
  /// 第 `anchor` 个锚点第 `attr` 个属性在扁平数组中的位置
  #[inline(always)]
  pub fn index(&self, anchor: usize, attr: usize) -> usize {
    if self.channel_first {
      attr * self.num_anchors + anchor
    } else {
      anchor * self.num_vectors + attr
    }
  }

  /// `num_anchors * num_vectors`，构造时已确认不会溢出
  pub fn element_count(&self) -> usize {
    self.element_count
  }
}

/// 根据输出形状与类别数判定布局
///
/// `[d2, d3]` 视为省略了 batch 维度。类别数对不上时不会报错，
/// 返回的布局 `matched == false`，按无 objectness 的方式尽量解码。
pub fn resolve_layout(
  shape: &[usize],
  class_count: usize,
  hint: LayoutHint,
) -> Result<OutputLayout, LayoutError> {
  let (d2, d3) = match *shape {
    [1, d2, d3] | [d2, d3] => (d2, d3),
    _ => return Err(LayoutError::UnsupportedShape(shape.to_vec())),
  };
  if d2 == 0 || d3 == 0 {
    return Err(LayoutError::UnsupportedShape(shape.to_vec()));
  }
  let Some(element_count) = d2.checked_mul(d3) else {
    return Err(LayoutError::Overflow(shape.to_vec()));
  };

  let channel_first = match hint {
    LayoutHint::Auto => d3 > d2,
    LayoutHint::ChannelFirst => true,
    LayoutHint::AnchorFirst => false,
  };
  let (num_vectors, num_anchors) = if channel_first { (d2, d3) } else { (d3, d2) };

  if num_vectors < BOX_ATTRIBUTES {
    return Err(LayoutError::TooNarrow {
      shape: shape.to_vec(),
      num_vectors,
    });
  }

  let (has_objectness, class_offset, matched) = if num_vectors == 5 + class_count {
    (true, OBJECTNESS_INDEX + 1, true)
  } else if num_vectors == BOX_ATTRIBUTES + class_count {
    (false, BOX_ATTRIBUTES, true)
  } else {
    (false, BOX_ATTRIBUTES, false)
  };

  let ambiguous = hint == LayoutHint::Auto
    && d2
      .min(d3)
      .checked_mul(MIN_ANCHOR_RATIO)
      .is_none_or(|limit| d2.max(d3) < limit);

  Ok(OutputLayout {
    num_anchors,
    num_vectors,
    channel_first,
    has_objectness,
    class_offset,
    class_slots: num_vectors - class_offset,
    matched,
    ambiguous,
    element_count,
  })
}
