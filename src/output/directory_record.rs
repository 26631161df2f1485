// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::AsNhwcFrame,
  model::{CycleStatus, DetectResult},
  output::{
    Render,
    draw::{Draw, Record, ToRgbImage},
  },
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧数据与尺寸 {0}x{1} 不符")]
  InvalidFrame(u32, u32),
}

/// 保存方式：画框后的图片，或原图加 JSON 记录
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result<F>(
    &self,
    path: &Path,
    frame: &F,
    result: &DetectResult,
  ) -> Result<(), DirectoryRecordOutputError>
  where
    F: AsNhwcFrame + ?Sized,
  {
    let invalid = || DirectoryRecordOutputError::InvalidFrame(frame.width(), frame.height());
    match self {
      DrawWrapper::Draw(draw) => {
        let image = draw.draw_detection(frame, result).ok_or_else(invalid)?;
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        let image = frame.to_rgb_image().ok_or_else(invalid)?;
        image.save(path)?;
        record.record(frame, result, path)?;
      }
    };

    Ok(())
  }
}

/// 按日期分目录保存每一帧：`<dir>/<yyyy>/<mm>/<dd>/<HH-MM-SS>-<序号>.png`
///
/// 默认只保存有检测结果的帧，`always` 参数保存所有完成检测的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  /// `folder:///path?record&always`
  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(url_path(uri), record, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, record: bool, always: bool) -> Self {
    let draw = if record {
      DrawWrapper::Record(Record)
    } else {
      DrawWrapper::Draw(Box::default())
    };
    Self {
      directory: directory.into(),
      draw,
      frame_counter: AtomicU16::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<F: AsNhwcFrame + ?Sized> Render<F, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    if result.status != CycleStatus::Completed {
      return Ok(());
    }
    if !self.always && result.is_empty() {
      return Ok(());
    }
    if !frame.is_ready() {
      debug!("输入源未就绪, 不保存");
      return Ok(());
    }

    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result)?;
    debug!("保存帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::RgbNhwcFrame,
    model::{BBox, Detection},
  };

  fn saved_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          pending.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files.sort();
    files
  }

  fn one_detection() -> DetectResult {
    DetectResult {
      items: vec![Detection {
        class_id: 0,
        label: "saung_instrument".to_string(),
        confidence: 0.8,
        bbox: BBox {
          x: 0.1,
          y: 0.1,
          width: 0.5,
          height: 0.5,
        },
      }]
      .into_boxed_slice(),
      ..DetectResult::empty(CycleStatus::Completed)
    }
  }

  #[test]
  fn test_empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbNhwcFrame::filled(8, 8, [0, 0, 0]);
    let empty = DetectResult::empty(CycleStatus::Completed);

    let output = DirectoryRecordOutput::new(dir.path(), false, false);
    output.render_result(&frame, &empty).unwrap();
    assert!(saved_files(dir.path()).is_empty());

    output.render_result(&frame, &one_detection()).unwrap();
    assert_eq!(saved_files(dir.path()).len(), 1);

    let other = tempfile::tempdir().unwrap();
    let always = DirectoryRecordOutput::new(other.path(), false, true);
    always.render_result(&frame, &empty).unwrap();
    assert_eq!(saved_files(other.path()).len(), 1);
  }

  #[test]
  fn test_unfinished_cycles_are_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbNhwcFrame::filled(8, 8, [0, 0, 0]);
    let output = DirectoryRecordOutput::new(dir.path(), false, true);

    for status in [CycleStatus::Skipped, CycleStatus::TimedOut, CycleStatus::NotReady] {
      output.render_result(&frame, &DetectResult::empty(status)).unwrap();
    }
    assert!(saved_files(dir.path()).is_empty());
  }

  #[test]
  fn test_record_mode_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = RgbNhwcFrame::filled(8, 8, [0, 0, 0]);
    output.render_result(&frame, &one_detection()).unwrap();

    let files = saved_files(dir.path());
    let extensions: Vec<_> = files
      .iter()
      .map(|f| f.extension().unwrap().to_str().unwrap().to_string())
      .collect();
    assert_eq!(extensions, vec!["json", "png"]);
    assert!(files[1].file_name().unwrap().to_str().unwrap().ends_with("-0001.png"));
  }
}
