// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model/replay.rs - 回放推理后端
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

use std::{collections::HashMap, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::InferenceBackend,
  tensor::{RawTensor, TensorError, TensorMap},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayBackendError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("无效的延迟参数: {0}")]
  InvalidDelay(String),
}

#[derive(Deserialize)]
struct RecordedTensor {
  shape: Vec<usize>,
  data: Vec<f32>,
}

/// 回放预先录制的模型输出，不论输入是什么
///
/// 文件格式为 `{"output0": {"shape": [1, 10, 8400], "data": [...]}}`。
/// 用于在没有推理运行时的环境中联调整条流水线。
#[derive(Debug, Clone)]
pub struct ReplayBackend {
  outputs: TensorMap,
  delay: Option<Duration>,
}

impl FromUrlWithScheme for ReplayBackend {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayBackend {
  type Error = ReplayBackendError;

  /// `replay:///path/to/outputs.json?delay_ms=30`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayBackendError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut backend = Self::open(url_path(url))?;
    if let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "delay_ms") {
      let ms = value
        .parse::<u64>()
        .map_err(|_| ReplayBackendError::InvalidDelay(value.to_string()))?;
      backend = backend.with_delay(Duration::from_millis(ms));
    }
    Ok(backend)
  }
}

impl ReplayBackend {
  pub fn new(outputs: TensorMap) -> Self {
    Self {
      outputs,
      delay: None,
    }
  }

  /// 每次推理前先等待，模拟推理耗时
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay).filter(|d| !d.is_zero());
    self
  }

  pub fn from_json_str(content: &str) -> Result<Self, ReplayBackendError> {
    let recorded: HashMap<String, RecordedTensor> = serde_json::from_str(content)?;
    let outputs = recorded
      .into_iter()
      .map(|(name, tensor)| -> Result<_, ReplayBackendError> {
        Ok((name, RawTensor::new(tensor.shape, tensor.data)?))
      })
      .collect::<Result<TensorMap, _>>()?;
    Ok(Self::new(outputs))
  }

  pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayBackendError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let backend = Self::from_json_str(&content)?;
    info!(
      "回放后端: {}, 输出 {:?}",
      path.display(),
      backend.outputs.names().collect::<Vec<_>>()
    );
    Ok(backend)
  }

  pub fn outputs(&self) -> &TensorMap {
    &self.outputs
  }
}

impl InferenceBackend for ReplayBackend {
  type Error = ReplayBackendError;

  async fn infer(&self, input: RawTensor, input_name: &str) -> Result<TensorMap, Self::Error> {
    debug!("回放推理: {} {:?}", input_name, input.shape());
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    Ok(self.outputs.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const RECORDED: &str = r#"{
    "output0": { "shape": [1, 5, 2], "data": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10] }
  }"#;

  #[test]
  fn test_from_json_str() {
    let backend = ReplayBackend::from_json_str(RECORDED).unwrap();
    let tensor = backend.outputs().get("output0").unwrap();
    assert_eq!(tensor.shape(), &[1, 5, 2]);
    assert_eq!(tensor.data()[9], 10.0);
  }

  #[test]
  fn test_shape_mismatch_is_rejected() {
    let err = ReplayBackend::from_json_str(r#"{"output0": {"shape": [1, 5, 3], "data": [1]}}"#)
      .unwrap_err();
    assert!(matches!(err, ReplayBackendError::TensorError(_)));
  }

  #[test]
  #[cfg(target_pointer_width = "64")]
  fn test_overflowing_shape_is_rejected() {
    let err = ReplayBackend::from_json_str(
      r#"{"output0": {"shape": [1, 4294967296, 4294967296], "data": []}}"#,
    )
    .unwrap_err();
    assert!(matches!(
      err,
      ReplayBackendError::TensorError(TensorError::ShapeOverflow(_))
    ));
  }

  #[test]
  fn test_from_url_with_delay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outputs.json");
    std::fs::write(&path, RECORDED).unwrap();

    let url = Url::parse(&format!("replay://{}?delay_ms=15", path.display())).unwrap();
    let backend = ReplayBackend::from_url(&url).unwrap();
    assert_eq!(backend.delay, Some(Duration::from_millis(15)));

    let url = Url::parse(&format!("replay://{}?delay_ms=soon", path.display())).unwrap();
    assert!(matches!(
      ReplayBackend::from_url(&url),
      Err(ReplayBackendError::InvalidDelay(_))
    ));

    let url = Url::parse(&format!("file://{}", path.display())).unwrap();
    assert!(matches!(
      ReplayBackend::from_url(&url),
      Err(ReplayBackendError::SchemeMismatch(_))
    ));
  }

  #[tokio::test]
  async fn test_infer_returns_recording() {
    let backend = ReplayBackend::from_json_str(RECORDED).unwrap();
    let input = RawTensor::new(vec![1, 3, 2, 2], vec![0.0f32; 12]).unwrap();
    let outputs = backend.infer(input, "images").await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs.get("output0").is_some());
  }
}
