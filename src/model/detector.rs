// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/model/detector.rs - 检测流水线
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
  sync::{
    Once, OnceLock,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::{ClassCatalog, ConfigError, DetectorConfig},
  input::AsNhwcFrame,
  model::{
    CycleStatus, CycleTimings, DetectResult, Detection, InferenceBackend,
    decode::decode_anchors,
    layout::{LayoutError, resolve_layout},
    nms::non_maximum_suppression,
  },
  preprocess::{LetterboxTransform, PreprocessError, letterbox},
  tensor::TensorMap,
};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("推理错误: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("未找到模型输出, 已尝试 {tried:?}, 实际输出 {available:?}")]
  MissingOutput {
    tried: Vec<String>,
    available: Vec<String>,
  },
  #[error("输出布局错误: {0}")]
  Layout(#[from] LayoutError),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
}

/// 同一时刻只允许一轮检测，离开作用域时释放
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .ok()
      .map(|_| InFlightGuard(flag))
  }
}

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// 检测器：预处理、推理、解码、NMS
///
/// 推理后端可以在构造之后再加载；加载前的调用返回 [`CycleStatus::NotReady`]。
pub struct Detector<B> {
  config: DetectorConfig,
  catalog: ClassCatalog,
  backend: OnceLock<B>,
  in_flight: AtomicBool,
  mismatch_warning: Once,
  layout_warning: Once,
}

impl<B: InferenceBackend> Detector<B> {
  pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
    config.validate()?;
    let catalog = config.class_catalog()?;
    info!(
      "检测器配置: 输入 {}x{}, 置信度阈值 {}, NMS 阈值 {}, 超时 {:?}, 类别数 {}",
      config.input_size,
      config.input_size,
      config.confidence_threshold,
      config.iou_threshold,
      config.inference_timeout(),
      catalog.len()
    );

    Ok(Self {
      config,
      catalog,
      backend: OnceLock::new(),
      in_flight: AtomicBool::new(false),
      mismatch_warning: Once::new(),
      layout_warning: Once::new(),
    })
  }

  pub fn with_backend(config: DetectorConfig, backend: B) -> Result<Self, DetectError> {
    let detector = Self::new(config)?;
    // 新建的 OnceLock 必然为空
    let _ = detector.backend.set(backend);
    Ok(detector)
  }

  /// 加载推理后端，已加载时原样返回传入的后端
  pub fn load_backend(&self, backend: B) -> Result<(), B> {
    self.backend.set(backend)?;
    info!("推理后端已加载");
    Ok(())
  }

  pub fn is_loaded(&self) -> bool {
    self.backend.get().is_some()
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  /// 对当前帧执行一轮检测
  ///
  /// 输入源或后端未就绪、推理超时、上一轮尚未结束时返回空结果而不是错误，
  /// 通过 [`DetectResult::status`] 区分。帧数据不完整时返回错误。
  pub async fn detect<F: AsNhwcFrame + ?Sized>(&self, frame: &F) -> Result<DetectResult, DetectError> {
    let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
      debug!("上一轮检测尚未完成, 跳过本轮");
      return Ok(DetectResult::empty(CycleStatus::Skipped));
    };

    let Some(backend) = self.backend.get() else {
      debug!("推理后端尚未加载");
      return Ok(DetectResult::empty(CycleStatus::NotReady));
    };

    let now = Instant::now();
    let (tensor, transform) = match letterbox(frame, self.config.input_size) {
      Ok(prepared) => prepared,
      Err(e @ PreprocessError::NotReady { .. }) => {
        debug!("{}", e);
        return Ok(DetectResult::empty(CycleStatus::NotReady));
      }
      Err(e) => return Err(e.into()),
    };
    let preprocess = now.elapsed();

    let now = Instant::now();
    let timeout = self.config.inference_timeout();
    let outputs = match tokio::time::timeout(timeout, backend.infer(tensor, &self.config.input_name)).await {
      Ok(Ok(outputs)) => outputs,
      Ok(Err(e)) => return Err(DetectError::Inference(Box::new(e))),
      Err(_) => {
        debug!("推理超时 ({:?}), 丢弃本轮结果", timeout);
        return Ok(DetectResult::empty(CycleStatus::TimedOut));
      }
    };
    let inference = now.elapsed();

    let now = Instant::now();
    let items = self.postprocess(&outputs, &transform)?;
    let postprocess = now.elapsed();

    debug!(
      "检测到 {} 个目标, 预处理 {:.2?}, 推理 {:.2?}, 后处理 {:.2?}",
      items.len(),
      preprocess,
      inference,
      postprocess
    );

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      status: CycleStatus::Completed,
      timings: CycleTimings {
        preprocess,
        inference,
        postprocess,
      },
      transform: (!self.config.map_to_source).then_some(transform),
    })
  }

  /// 解码推理输出：布局判定、锚点过滤、坐标归一化、NMS
  pub fn postprocess(
    &self,
    outputs: &TensorMap,
    transform: &LetterboxTransform,
  ) -> Result<Vec<Detection>, DetectError> {
    let Some((name, output)) = outputs.find_first(&self.config.output_names) else {
      return Err(DetectError::MissingOutput {
        tried: self.config.output_names.clone(),
        available: outputs.names().map(str::to_string).collect(),
      });
    };

    let class_count = self.catalog.len();
    let layout = resolve_layout(output.shape(), class_count, self.config.layout)?;
    debug!("输出 {} 形状 {:?}, 布局 {:?}", name, output.shape(), layout);

    if !layout.matched {
      self.mismatch_warning.call_once(|| {
        warn!(
          "输出向量宽度 {} 与类别数 {} 不匹配 (期望 {} 或 {}), 按无 objectness 尽量解码",
          layout.num_vectors,
          class_count,
          4 + class_count,
          5 + class_count
        );
      });
    }
    if layout.ambiguous {
      self.layout_warning.call_once(|| {
        warn!(
          "输出形状 {:?} 的锚点数并未明显大于向量宽度, 布局判定为 {}, 可在配置中指定 layout",
          output.shape(),
          if layout.channel_first {
            "channel_first"
          } else {
            "anchor_first"
          }
        );
      });
    }

    let mut candidates = Vec::new();
    decode_anchors(
      output.data(),
      &layout,
      self.config.confidence_threshold,
      &mut candidates,
    );

    let input_size = self.config.input_size as f32;
    let detections = candidates
      .iter()
      .filter_map(|candidate| {
        let bbox = candidate.normalized(input_size)?;
        let bbox = if self.config.map_to_source {
          transform.to_source(&bbox)
        } else {
          bbox
        };
        Some(Detection {
          class_id: candidate.class_id,
          label: self.catalog.label_or_fallback(candidate.class_id),
          confidence: candidate.confidence,
          bbox,
        })
      })
      .collect::<Vec<_>>();

    debug!(
      "{} 个锚点通过阈值, {} 个框有效",
      candidates.len(),
      detections.len()
    );

    Ok(non_maximum_suppression(detections, self.config.iou_threshold))
  }
}
