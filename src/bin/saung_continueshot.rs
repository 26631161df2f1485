// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/bin/saung_continueshot.rs - 按周期连续检测
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use saung_detect::{
  FromUrl,
  args::{DetectArgs, init_tracing},
  input::InputWrapper,
  model::{Detector, ReplayBackend},
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// 按固定周期逐帧检测，Ctrl-C 退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub detect: DetectArgs,

  /// 检测周期（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 100)]
  pub period_ms: u64,

  /// 最大处理帧数，不指定时处理到输入结束
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();
  args.detect.log_summary();
  info!("检测周期: {} ms", args.period_ms);

  let config = args.detect.detector_config()?;
  let input = InputWrapper::from_url(&args.detect.input)?;
  let backend = ReplayBackend::from_url(&args.detect.model)?;
  let detector = Detector::with_backend(config, backend)?;
  let output = OutputWrapper::from_url(&args.detect.output)?;

  ContinuousTask::default()
    .with_period(Duration::from_millis(args.period_ms))
    .with_frame_number(args.frame_number)
    .with_ctrlc()?
    .run_task(input, detector, output)
    .await?;

  Ok(())
}
