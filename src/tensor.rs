// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/tensor.rs - 推理张量定义
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

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量形状 {shape:?} 需要 {expected} 个元素, 实际为 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("张量形状 {0:?} 的元素个数超出 usize 范围")]
  ShapeOverflow(Vec<usize>),
}

/// 形状对应的元素个数，乘积溢出时返回 `None`
pub fn element_count(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// 不可变的浮点张量，数据在克隆间共享
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  shape: Box<[usize]>,
  data: Arc<[f32]>,
}

impl RawTensor {
  pub fn new(shape: impl Into<Vec<usize>>, data: impl Into<Arc<[f32]>>) -> Result<Self, TensorError> {
    let shape = shape.into();
    let data = data.into();
    let Some(expected) = element_count(&shape) else {
      return Err(TensorError::ShapeOverflow(shape));
    };
    if expected != data.len() {
      return Err(TensorError::ShapeMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape: shape.into_boxed_slice(),
      data,
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

/// 推理输出：按名称索引的张量集合
#[derive(Debug, Clone, Default)]
pub struct TensorMap {
  tensors: HashMap<String, RawTensor>,
}

impl TensorMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, tensor: RawTensor) -> Self {
    self.insert(name, tensor);
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, tensor: RawTensor) -> Option<RawTensor> {
    self.tensors.insert(name.into(), tensor)
  }

  pub fn get(&self, name: &str) -> Option<&RawTensor> {
    self.tensors.get(name)
  }

  /// 按给定顺序查找第一个存在的输出
  pub fn find_first<'a, S: AsRef<str>>(&'a self, names: &'a [S]) -> Option<(&'a str, &'a RawTensor)> {
    names
      .iter()
      .map(AsRef::as_ref)
      .find_map(|name| self.tensors.get(name).map(|tensor| (name, tensor)))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tensors.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}

impl<S: Into<String>> FromIterator<(S, RawTensor)> for TensorMap {
  fn from_iter<T: IntoIterator<Item = (S, RawTensor)>>(iter: T) -> Self {
    Self {
      tensors: iter
        .into_iter()
        .map(|(name, tensor)| (name.into(), tensor))
        .collect(),
    }
  }
}
