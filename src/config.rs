// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/config.rs - 检测器配置与类别表
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

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// 默认模型的类别名称，下标即输出通道序号
pub const SAUNG_CLASSES: [&str; 6] = [
  "saung_instrument",
  "left_hand",
  "right_hand",
  "left_thumb",
  "right_thumb",
  "plucking_finger",
];

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置解析错误: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("{name} 必须在 [0, 1] 之间, 实际为 {value}")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("模型输入尺寸必须大于 0")]
  InvalidInputSize,
  #[error("推理超时必须大于 0")]
  InvalidTimeout,
  #[error("类别表为空")]
  EmptyCatalog,
}

/// 输出张量布局的判定方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
  /// 较大的维度视为锚点数
  #[default]
  Auto,
  /// `[1, vectors, anchors]`
  ChannelFirst,
  /// `[1, anchors, vectors]`
  AnchorFirst,
}

/// 有序类别名称表，加载后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCatalog {
  names: Arc<[String]>,
}

#[derive(Deserialize)]
struct LabelFile {
  labels: Vec<String>,
}

impl ClassCatalog {
  pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(ConfigError::EmptyCatalog);
    }
    Ok(Self {
      names: names.into(),
    })
  }

  pub fn saung() -> Self {
    Self {
      names: SAUNG_CLASSES.iter().map(|s| s.to_string()).collect(),
    }
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let file: LabelFile = toml::from_str(content)?;
    Self::new(file.labels)
  }

  pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let catalog = Self::from_toml_str(&content)?;
    info!("从 {} 加载 {} 个类别", path.display(), catalog.len());
    Ok(catalog)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn label(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 超出类别表的序号（输出通道多于类别数时）使用 `class_<id>`
  pub fn label_or_fallback(&self, class_id: u32) -> String {
    self
      .label(class_id)
      .map(str::to_string)
      .unwrap_or_else(|| format!("class_{class_id}"))
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl Default for ClassCatalog {
  fn default() -> Self {
    Self::saung()
  }
}

/// 检测器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// 模型输入正方形边长
  pub input_size: u32,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  /// 单次推理的最长等待时间，超时视为本轮无检测结果
  pub inference_timeout_ms: u64,
  pub input_name: String,
  /// 按顺序查找的输出名称
  pub output_names: Vec<String>,
  pub layout: LayoutHint,
  /// 是否把坐标从模型输入空间映射回源图像空间
  pub map_to_source: bool,
  /// 类别 TOML 文件，优先于 `classes`
  pub labels: Option<PathBuf>,
  pub classes: Vec<String>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      inference_timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
      input_name: "images".to_string(),
      output_names: vec!["output0".to_string(), "output".to_string()],
      layout: LayoutHint::Auto,
      map_to_source: false,
      labels: None,
      classes: Vec::new(),
    }
  }
}

impl DetectorConfig {
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::from_toml_str(&content)?;

    // 标签文件路径相对于配置文件所在目录
    if let Some(labels) = config.labels.as_mut()
      && labels.is_relative()
      && let Some(parent) = path.parent()
    {
      *labels = parent.join(&*labels);
    }
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::InvalidInputSize);
    }
    if self.inference_timeout_ms == 0 {
      return Err(ConfigError::InvalidTimeout);
    }
    for (name, value) in [
      ("confidence_threshold", self.confidence_threshold),
      ("iou_threshold", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold { name, value });
      }
    }
    Ok(())
  }

  pub fn inference_timeout(&self) -> Duration {
    Duration::from_millis(self.inference_timeout_ms)
  }

  /// 标签文件 > 内联类别 > 内置类别
  pub fn class_catalog(&self) -> Result<ClassCatalog, ConfigError> {
    if let Some(path) = &self.labels {
      ClassCatalog::from_toml_file(path)
    } else if !self.classes.is_empty() {
      ClassCatalog::new(self.classes.iter().cloned())
    } else {
      Ok(ClassCatalog::saung())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = DetectorConfig::default();
    assert_eq!(config.input_size, 640);
    assert_eq!(config.confidence_threshold, 0.25);
    assert_eq!(config.iou_threshold, 0.45);
    assert_eq!(config.inference_timeout(), Duration::from_millis(100));
    assert_eq!(config.layout, LayoutHint::Auto);
    assert!(!config.map_to_source);
    assert_eq!(config.class_catalog().unwrap().len(), 6);
  }

  #[test]
  fn test_partial_toml_keeps_defaults() {
    let config = DetectorConfig::from_toml_str(
      r#"
        confidence_threshold = 0.5
        layout = "anchor_first"
        classes = ["hand", "thumb"]
      "#,
    )
    .unwrap();

    assert_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.iou_threshold, 0.45);
    assert_eq!(config.layout, LayoutHint::AnchorFirst);
    let catalog = config.class_catalog().unwrap();
    assert_eq!(catalog.iter().collect::<Vec<_>>(), vec!["hand", "thumb"]);
  }

  #[test]
  fn test_rejects_out_of_range_threshold() {
    let err = DetectorConfig::from_toml_str("iou_threshold = 1.5").unwrap_err();
    assert!(matches!(
      err,
      ConfigError::InvalidThreshold {
        name: "iou_threshold",
        ..
      }
    ));
    assert!(matches!(
      DetectorConfig::from_toml_str("input_size = 0"),
      Err(ConfigError::InvalidInputSize)
    ));
  }

  #[test]
  fn test_labels_file_relative_to_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("labels.toml"),
      "labels = [\"saung_instrument\", \"right_hand\", \"right_thumb\"]\n",
    )
    .unwrap();
    let config_path = dir.path().join("detector.toml");
    std::fs::write(&config_path, "labels = \"labels.toml\"\n").unwrap();

    let config = DetectorConfig::from_file(&config_path).unwrap();
    let catalog = config.class_catalog().unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.label(2), Some("right_thumb"));
    assert_eq!(catalog.label(3), None);
    assert_eq!(catalog.label_or_fallback(7), "class_7");
  }

  #[test]
  fn test_empty_catalog_is_rejected() {
    assert!(matches!(
      ClassCatalog::from_toml_str("labels = []"),
      Err(ConfigError::EmptyCatalog)
    ));
  }
}
