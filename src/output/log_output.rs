// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::AsNhwcFrame,
  model::{CycleStatus, DetectResult},
  output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 只把检测结果写入日志，`log://?quiet` 时跳过空结果
#[derive(Debug, Default)]
pub struct LogOutput {
  quiet: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(Self {
      quiet: url.query_pairs().any(|(k, _)| k == "quiet"),
    })
  }
}

impl<F: AsNhwcFrame + ?Sized> Render<F, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    if result.status != CycleStatus::Completed {
      debug!("本轮无结果: {:?}", result.status);
      return Ok(());
    }
    if self.quiet && result.is_empty() {
      return Ok(());
    }

    info!(
      "帧 {}x{}: {} 个目标, 耗时 {:.2?}",
      frame.width(),
      frame.height(),
      result.len(),
      result.timings.total()
    );
    for (item, bbox) in result.source_boxes() {
      info!(
        "  {:<18} {:.3}  x={:.4} y={:.4} w={:.4} h={:.4}",
        item.label, item.confidence, bbox.x, bbox.y, bbox.width, bbox.height
      );
    }
    Ok(())
  }
}
