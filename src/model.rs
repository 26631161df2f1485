// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model.rs - 模型
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

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
  preprocess::LetterboxTransform,
  tensor::{RawTensor, TensorMap},
};

/// 外部推理运行时：输入一个张量，返回按名称索引的输出
///
/// 加载模型与执行前向计算不在本库范围内，由实现者负责。
pub trait InferenceBackend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(
    &self,
    input: RawTensor,
    input_name: &str,
  ) -> impl Future<Output = Result<TensorMap, Self::Error>> + Send;
}

/// 左上角形式的归一化边界框
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub class_id: u32,
  pub label: String,
  pub confidence: f32,
  pub bbox: BBox,
}

/// 一轮检测的结束状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
  #[default]
  Completed,
  /// 输入源或模型尚未就绪
  NotReady,
  /// 推理超时，结果被丢弃
  TimedOut,
  /// 上一轮仍在进行，本轮被跳过
  Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTimings {
  pub preprocess: Duration,
  pub inference: Duration,
  pub postprocess: Duration,
}

impl CycleTimings {
  pub fn total(&self) -> Duration {
    self.preprocess + self.inference + self.postprocess
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub status: CycleStatus,
  pub timings: CycleTimings,
  /// 坐标仍在模型输入空间时携带变换，供绘制时映射回源图像
  pub transform: Option<LetterboxTransform>,
}

impl DetectResult {
  pub fn empty(status: CycleStatus) -> Self {
    Self {
      items: Box::new([]),
      status,
      timings: CycleTimings::default(),
      transform: None,
    }
  }

  /// 源图像归一化坐标下的检测框
  pub fn source_boxes(&self) -> impl Iterator<Item = (&Detection, BBox)> {
    self.items.iter().map(|item| {
      let bbox = match &self.transform {
        Some(transform) => transform.to_source(&item.bbox),
        None => item.bbox,
      };
      (item, bbox)
    })
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

pub mod decode;
pub mod layout;
pub mod nms;

mod detector;
pub use self::detector::{DetectError, Detector};

mod replay;
pub use self::replay::{ReplayBackend, ReplayBackendError};
