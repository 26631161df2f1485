// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use thiserror::Error;

use crate::input::AsNhwcFrame;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 交错排列的 RGB8 帧，宽或高为 0 表示输入源尚未就绪
#[derive(Debug, Clone, Default)]
pub struct RgbNhwcFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn with_shape(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * width as usize * height as usize;
    Self {
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  /// 用单一颜色填充的帧
  pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
    let data = rgb
      .iter()
      .copied()
      .cycle()
      .take(RGB_CHANNELS * width as usize * height as usize)
      .collect::<Vec<_>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
    if x >= self.width || y >= self.height {
      return;
    }
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    self.data[idx..idx + RGB_CHANNELS].copy_from_slice(&rgb);
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(feature = "image")]
impl From<image::RgbImage> for RgbNhwcFrame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    // RgbImage 本身就是交错排列的 RGB8
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(feature = "image")]
impl AsNhwcFrame for image::RgbImage {
  fn width(&self) -> u32 {
    self.dimensions().0
  }

  fn height(&self) -> u32 {
    self.dimensions().1
  }

  fn as_nhwc(&self) -> &[u8] {
    self.as_raw()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_checks_length() {
    assert!(RgbNhwcFrame::new(2, 2, vec![0; 12]).is_ok());
    assert_eq!(
      RgbNhwcFrame::new(2, 2, vec![0; 11]).unwrap_err(),
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn test_default_frame_is_not_ready() {
    let frame = RgbNhwcFrame::default();
    assert!(!frame.is_ready());
    assert!(RgbNhwcFrame::filled(4, 3, [1, 2, 3]).is_ready());
  }

  #[test]
  fn test_put_pixel_is_interleaved() {
    let mut frame = RgbNhwcFrame::with_shape(2, 2);
    frame.put_pixel(1, 1, [10, 20, 30]);
    assert_eq!(&frame.as_nhwc()[9..12], &[10, 20, 30]);
    // 越界写入被忽略
    frame.put_pixel(5, 5, [1, 1, 1]);
  }
}
