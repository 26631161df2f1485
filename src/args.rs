// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::{ConfigError, DetectorConfig};

/// 各个检测程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 推理后端，例如 replay:///path/to/outputs.json?delay_ms=30
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/to/frame.png
  /// - 目录: folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出
  /// 支持格式:
  /// - 日志: log://
  /// - 图片: image:///path/to/result.png
  /// - 目录: folder:///path/to/records?record&always
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 检测器配置文件 (TOML)
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// 推理超时（毫秒），覆盖配置文件
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,

  /// 类别表文件 (TOML)，覆盖配置文件
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输出坐标映射回源图像
  #[arg(long)]
  pub map_to_source: bool,
}

impl DetectArgs {
  /// 读取配置文件（没有时使用默认值），再应用命令行覆盖项
  pub fn detector_config(&self) -> Result<DetectorConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => DetectorConfig::from_file(path)?,
      None => DetectorConfig::default(),
    };

    if let Some(confidence) = self.confidence {
      config.confidence_threshold = confidence;
    }
    if let Some(threshold) = self.nms_threshold {
      config.iou_threshold = threshold;
    }
    if let Some(timeout_ms) = self.timeout_ms {
      config.inference_timeout_ms = timeout_ms;
    }
    if let Some(labels) = &self.labels {
      config.labels = Some(labels.clone());
    }
    if self.map_to_source {
      config.map_to_source = true;
    }

    config.validate()?;
    Ok(config)
  }

  pub fn log_summary(&self) {
    info!("推理后端: {}", self.model);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
    if let Some(config) = &self.config {
      info!("配置文件: {}", config.display());
    }
  }
}

/// 初始化日志，`RUST_LOG` 未设置时默认 info
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestCli {
    #[command(flatten)]
    detect: DetectArgs,
  }

  #[test]
  fn test_cli_overrides_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detector.toml");
    std::fs::write(
      &path,
      "confidence_threshold = 0.4\niou_threshold = 0.6\ninference_timeout_ms = 250\n",
    )
    .unwrap();

    let cli = TestCli::parse_from([
      "saung",
      "--model",
      "replay:///tmp/outputs.json",
      "--input",
      "image:///tmp/frame.png",
      "--config",
      path.to_str().unwrap(),
      "--confidence",
      "0.3",
    ]);
    let config = cli.detect.detector_config().unwrap();
    assert_eq!(config.confidence_threshold, 0.3);
    assert_eq!(config.iou_threshold, 0.6);
    assert_eq!(config.inference_timeout_ms, 250);
    assert_eq!(cli.detect.output.scheme(), "log");
  }

  #[test]
  fn test_invalid_override_is_rejected() {
    let cli = TestCli::parse_from([
      "saung",
      "--model",
      "replay:///tmp/outputs.json",
      "--input",
      "image:///tmp/frame.png",
      "--timeout-ms",
      "0",
    ]);
    assert!(matches!(
      cli.detect.detector_config(),
      Err(ConfigError::InvalidTimeout)
    ));
  }
}
