// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/task.rs - 检测任务
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

use std::{future::Future, thread, time::Duration};

use tokio::{
  sync::mpsc,
  time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
  input::AsNhwcFrame,
  model::{CycleStatus, DetectResult, Detector, InferenceBackend},
  output::Render,
};

pub const DEFAULT_REPEAT_TIMES: usize = 1000;
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);
/// 收到中断信号后等待任务自行退出的时间
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, B, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    detector: Detector<B>,
    output: O,
  ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// 取第一帧做一次检测
pub struct OneShotTask;

impl<F, B, RE, I, O> Task<I, B, O> for OneShotTask
where
  F: AsNhwcFrame,
  B: InferenceBackend,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  O: Render<F, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  async fn run_task(self, mut input: I, detector: Detector<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始检测...", frame.width(), frame.height());
    let now = std::time::Instant::now();
    let result = detector.detect(&frame).await?;
    let elapsed = now.elapsed();
    info!(
      "检测完成 ({:?})，{} 个目标，耗时: {:.2?}",
      result.status,
      result.len(),
      elapsed
    );
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对第一帧重复检测，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      times: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }
}

/// 前两轮视为预热，不计入平均值
fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = if times.len() > 2 { &times[2..] } else { times };
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<F, B, RE, I, O> Task<I, B, O> for RepeatShotTask
where
  F: AsNhwcFrame,
  B: InferenceBackend,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  O: Render<F, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  async fn run_task(self, mut input: I, detector: Detector<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始检测 {} 次...", self.times);
    let mut times = Vec::with_capacity(self.times);
    let mut timed_out = 0usize;
    for i in 0..self.times {
      let now = std::time::Instant::now();
      let result = detector.detect(&frame).await?;
      let elapsed = now.elapsed();
      info!("({})检测完成，{} 个目标，耗时: {:.2?}", i, result.len(), elapsed);
      debug!(
        "({})预处理 {:.2?} / 推理 {:.2?} / 后处理 {:.2?}",
        i, result.timings.preprocess, result.timings.inference, result.timings.postprocess
      );
      if result.status == CycleStatus::TimedOut {
        timed_out += 1;
      }
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    if let Some(average) = average_after_warmup(&times) {
      warn!("平均检测时间: {:.2?}", average);
    }
    if timed_out > 0 {
      warn!("{} / {} 次推理超时", timed_out, times.len());
    }

    Ok(())
  }
}

/// 按固定周期从输入源取帧检测，直到输入结束、达到帧数或收到中断信号
#[derive(Debug)]
pub struct ContinuousTask {
  period: Duration,
  frame_number: Option<usize>,
  stop: Option<mpsc::UnboundedReceiver<()>>,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      period: DEFAULT_PERIOD,
      frame_number: None,
      stop: None,
    }
  }
}

impl ContinuousTask {
  pub fn with_period(mut self, period: Duration) -> Self {
    if period.is_zero() {
      warn!("检测周期不能为 0, 使用默认值 {:?}", DEFAULT_PERIOD);
    } else {
      self.period = period;
    }
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_signal(mut self, stop: mpsc::UnboundedReceiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  /// 安装 Ctrl-C 处理：通知任务退出，超时未退出则强制结束进程
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self.with_stop_signal(rx))
  }
}

#[derive(Debug, Default)]
struct CycleCounter {
  completed: usize,
  not_ready: usize,
  timed_out: usize,
  skipped: usize,
  detections: usize,
}

impl CycleCounter {
  fn count(&mut self, result: &DetectResult) {
    match result.status {
      CycleStatus::Completed => self.completed += 1,
      CycleStatus::NotReady => self.not_ready += 1,
      CycleStatus::TimedOut => self.timed_out += 1,
      CycleStatus::Skipped => self.skipped += 1,
    }
    self.detections += result.len();
  }
}

impl<F, B, RE, I, O> Task<I, B, O> for ContinuousTask
where
  F: AsNhwcFrame,
  B: InferenceBackend,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  O: Render<F, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  async fn run_task(mut self, mut input: I, detector: Detector<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务, 检测周期 {:?}...", self.period);

    let mut interval = tokio::time::interval(self.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut counter = CycleCounter::default();
    let mut frame_index = 0usize;
    let mut last = Instant::now();
    loop {
      let stopped = match self.stop.as_mut() {
        Some(stop) => tokio::select! {
          _ = interval.tick() => false,
          _ = stop.recv() => true,
        },
        None => {
          interval.tick().await;
          false
        }
      };
      if stopped {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      let Some(frame) = input.next() else {
        info!("输入结束，退出任务循环");
        break;
      };
      frame_index = frame_index.wrapping_add(1);
      debug!("处理第 {} 帧图像, 距上一帧 {:.2?}", frame_index, last.elapsed());
      last = Instant::now();

      let result = detector.detect(&frame).await?;
      counter.count(&result);
      output.render_result(&frame, &result)?;
      debug!("第 {} 帧完成，耗时: {:.2?}", frame_index, last.elapsed());

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!(
      "任务完成，共 {} 帧: 完成 {} / 未就绪 {} / 超时 {} / 跳过 {}, 检测到 {} 个目标",
      frame_index,
      counter.completed,
      counter.not_ready,
      counter.timed_out,
      counter.skipped,
      counter.detections
    );
    Ok(())
  }
}
