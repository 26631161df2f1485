// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/preprocess.rs - 信箱（letterbox）预处理
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

use crate::{
  frame::RGB_CHANNELS,
  input::AsNhwcFrame,
  model::BBox,
  tensor::{RawTensor, TensorError},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入源尚未就绪: {width}x{height}")]
  NotReady { width: u32, height: u32 },
  #[error("帧数据不完整: {width}x{height} 需要 {expected} 字节, 实际 {actual} 字节")]
  IncompleteFrame {
    width: u32,
    height: u32,
    expected: usize,
    actual: usize,
  },
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 填充区域的灰度值，模型按此值训练，不能改为黑色
pub const PADDING_VALUE: u8 = 128;

/// 描述源图像如何被缩放并填充到 `target_size` 正方形中
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub input_width: u32,
  pub input_height: u32,
  pub target_size: u32,
  pub scale: f32,
  pub offset_x: f32,
  pub offset_y: f32,
}

impl LetterboxTransform {
  /// 任一尺寸为 0 时返回 `None`
  pub fn new(input_width: u32, input_height: u32, target_size: u32) -> Option<Self> {
    if input_width == 0 || input_height == 0 || target_size == 0 {
      return None;
    }

    let size = target_size as f32;
    let aspect = input_width as f32 / input_height as f32;
    let (scale, offset_x, offset_y) = if aspect > 1.0 {
      let draw_height = size / aspect;
      (size / input_width as f32, 0.0, (size - draw_height) / 2.0)
    } else {
      let draw_width = size * aspect;
      (size / input_height as f32, (size - draw_width) / 2.0, 0.0)
    };

    Some(Self {
      input_width,
      input_height,
      target_size,
      scale,
      offset_x,
      offset_y,
    })
  }

  pub fn draw_width(&self) -> f32 {
    self.input_width as f32 * self.scale
  }

  pub fn draw_height(&self) -> f32 {
    self.input_height as f32 * self.scale
  }

  /// 画布上被源图像覆盖的像素范围 `(x0, x1, y0, y1)`，左闭右开
  pub fn draw_region(&self) -> (usize, usize, usize, usize) {
    let size = self.target_size as f32;
    let x0 = self.offset_x.round().clamp(0.0, size) as usize;
    let x1 = (self.offset_x + self.draw_width()).round().clamp(0.0, size) as usize;
    let y0 = self.offset_y.round().clamp(0.0, size) as usize;
    let y1 = (self.offset_y + self.draw_height()).round().clamp(0.0, size) as usize;
    (x0, x1, y0, y1)
  }

  /// 最近邻采样：画布像素中心对应的源像素坐标
  fn source_index(canvas: usize, offset: f32, scale: f32, limit: u32) -> usize {
    let src = ((canvas as f32 + 0.5 - offset) / scale).floor();
    src.clamp(0.0, (limit - 1) as f32) as usize
  }

  /// 将模型输入空间中的归一化框映射回源图像的归一化坐标
  pub fn to_source(&self, bbox: &BBox) -> BBox {
    let size = self.target_size as f32;
    let draw_width = self.draw_width();
    let draw_height = self.draw_height();

    let x = ((bbox.x * size - self.offset_x) / draw_width).clamp(0.0, 1.0);
    let y = ((bbox.y * size - self.offset_y) / draw_height).clamp(0.0, 1.0);
    let right = (((bbox.x + bbox.width) * size - self.offset_x) / draw_width).clamp(x, 1.0);
    let bottom = (((bbox.y + bbox.height) * size - self.offset_y) / draw_height).clamp(y, 1.0);

    BBox {
      x,
      y,
      width: right - x,
      height: bottom - y,
    }
  }
}

/// 把任意尺寸的 RGB8 帧转换为 `[1, 3, S, S]` 的平面 RGB 张量，数值归一化到 `[0, 1]`
///
/// 第一维是 batch，固定为 1，元素个数与 `[3, S, S]` 相同。
/// 宽或高为 0 时返回 [`PreprocessError::NotReady`]，调用方应跳过本轮检测；
/// 像素数据短于 `宽 * 高 * 3` 时返回 [`PreprocessError::IncompleteFrame`]。
pub fn letterbox<F: AsNhwcFrame + ?Sized>(
  frame: &F,
  target_size: u32,
) -> Result<(RawTensor, LetterboxTransform), PreprocessError> {
  let transform = LetterboxTransform::new(frame.width(), frame.height(), target_size).ok_or(
    PreprocessError::NotReady {
      width: frame.width(),
      height: frame.height(),
    },
  )?;

  let width = frame.width() as usize;
  let height = frame.height() as usize;
  let pixels = frame.as_nhwc();
  let expected = width * height * RGB_CHANNELS;
  if pixels.len() < expected {
    return Err(PreprocessError::IncompleteFrame {
      width: frame.width(),
      height: frame.height(),
      expected,
      actual: pixels.len(),
    });
  }

  let size = target_size as usize;
  let plane = size * size;
  let mut data = vec![PADDING_VALUE as f32 / 255.0; RGB_CHANNELS * plane];

  let (x0, x1, y0, y1) = transform.draw_region();
  let columns: Vec<usize> = (x0..x1)
    .map(|px| {
      LetterboxTransform::source_index(px, transform.offset_x, transform.scale, frame.width())
    })
    .collect();

  for py in y0..y1 {
    let sy = LetterboxTransform::source_index(py, transform.offset_y, transform.scale, frame.height());
    let row = &pixels[sy * width * RGB_CHANNELS..(sy + 1) * width * RGB_CHANNELS];
    for (px, &sx) in (x0..x1).zip(columns.iter()) {
      let src = sx * RGB_CHANNELS;
      let dst = py * size + px;
      data[dst] = row[src] as f32 / 255.0;
      data[plane + dst] = row[src + 1] as f32 / 255.0;
      data[2 * plane + dst] = row[src + 2] as f32 / 255.0;
    }
  }

  let tensor = RawTensor::new(vec![1, RGB_CHANNELS, size, size], data)?;
  Ok((tensor, transform))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::RgbNhwcFrame;

  const PAD: f32 = PADDING_VALUE as f32 / 255.0;

  /// 声称 4x4，但数据不足
  struct ShortFrame(Vec<u8>);

  impl AsNhwcFrame for ShortFrame {
    fn width(&self) -> u32 {
      4
    }

    fn height(&self) -> u32 {
      4
    }

    fn as_nhwc(&self) -> &[u8] {
      &self.0
    }
  }

  fn pixel(tensor: &RawTensor, size: usize, channel: usize, x: usize, y: usize) -> f32 {
    tensor.data()[channel * size * size + y * size + x]
  }

  #[test]
  fn test_zero_sized_source_is_not_ready() {
    assert_eq!(
      letterbox(&RgbNhwcFrame::default(), 640).unwrap_err(),
      PreprocessError::NotReady { width: 0, height: 0 }
    );
    assert!(matches!(
      letterbox(&RgbNhwcFrame::with_shape(0, 480), 640),
      Err(PreprocessError::NotReady { .. })
    ));
  }

  #[test]
  fn test_short_buffer_is_incomplete() {
    let frame = ShortFrame(vec![0u8; 10]);
    assert_eq!(
      letterbox(&frame, 64).unwrap_err(),
      PreprocessError::IncompleteFrame {
        width: 4,
        height: 4,
        expected: 48,
        actual: 10,
      }
    );
  }

  #[test]
  fn test_landscape_pads_top_and_bottom() {
    let frame = RgbNhwcFrame::filled(200, 100, [255, 255, 255]);
    let (tensor, transform) = letterbox(&frame, 64).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    assert_eq!(tensor.len(), 3 * 64 * 64);
    assert_eq!(transform.offset_x, 0.0);
    assert_eq!(transform.offset_y, 16.0);
    assert_eq!(transform.draw_region(), (0, 64, 16, 48));

    for c in 0..3 {
      assert_eq!(pixel(&tensor, 64, c, 10, 0), PAD);
      assert_eq!(pixel(&tensor, 64, c, 10, 15), PAD);
      assert_eq!(pixel(&tensor, 64, c, 10, 16), 1.0);
      assert_eq!(pixel(&tensor, 64, c, 63, 47), 1.0);
      assert_eq!(pixel(&tensor, 64, c, 10, 48), PAD);
    }
  }

  #[test]
  fn test_portrait_pads_left_and_right() {
    let frame = RgbNhwcFrame::filled(50, 100, [0, 0, 0]);
    let (tensor, transform) = letterbox(&frame, 32).unwrap();

    assert_eq!(transform.offset_x, 8.0);
    assert_eq!(transform.offset_y, 0.0);
    assert_eq!(transform.draw_region(), (8, 24, 0, 32));
    assert_eq!(pixel(&tensor, 32, 0, 7, 5), PAD);
    assert_eq!(pixel(&tensor, 32, 0, 8, 5), 0.0);
    assert_eq!(pixel(&tensor, 32, 2, 24, 31), PAD);
  }

  #[test]
  fn test_padding_and_range_hold_for_many_shapes() {
    for &(w, h, s) in &[(1, 1, 8), (3, 7, 16), (640, 480, 64), (17, 5, 33), (64, 64, 64)] {
      let frame = RgbNhwcFrame::filled(w, h, [255, 0, 10]);
      let (tensor, transform) = letterbox(&frame, s).unwrap();
      let size = s as usize;
      assert_eq!(tensor.len(), 3 * size * size);
      assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));

      let (x0, x1, y0, y1) = transform.draw_region();
      for y in 0..size {
        for x in 0..size {
          let inside = (x0..x1).contains(&x) && (y0..y1).contains(&y);
          let expected = if inside { [1.0, 0.0, 10.0 / 255.0] } else { [PAD; 3] };
          for (c, value) in expected.iter().enumerate() {
            assert_eq!(pixel(&tensor, size, c, x, y), *value, "({w}x{h}->{s}) at {x},{y}");
          }
        }
      }
    }
  }

  #[test]
  fn test_output_is_planar_rgb() {
    let mut frame = RgbNhwcFrame::with_shape(2, 2);
    frame.put_pixel(0, 0, [255, 0, 0]);
    frame.put_pixel(1, 0, [0, 255, 0]);
    frame.put_pixel(0, 1, [0, 0, 255]);
    let (tensor, _) = letterbox(&frame, 2).unwrap();

    assert_eq!(
      tensor.data(),
      &[
        1.0, 0.0, 0.0, 0.0, // R
        0.0, 1.0, 0.0, 0.0, // G
        0.0, 0.0, 1.0, 0.0, // B
      ]
    );
  }

  #[test]
  fn test_nearest_neighbour_upscale() {
    let mut frame = RgbNhwcFrame::with_shape(2, 1);
    frame.put_pixel(0, 0, [255, 255, 255]);
    let (tensor, transform) = letterbox(&frame, 4).unwrap();

    assert_eq!(transform.draw_region(), (0, 4, 1, 3));
    let row: Vec<f32> = (0..4).map(|x| pixel(&tensor, 4, 0, x, 1)).collect();
    assert_eq!(row, vec![1.0, 1.0, 0.0, 0.0]);
  }

  #[test]
  fn test_to_source_inverts_letterbox() {
    let transform = LetterboxTransform::new(1280, 640, 640).unwrap();
    assert_eq!(transform.offset_y, 160.0);

    // 覆盖整个绘制区域的框映射回整张源图
    let bbox = BBox {
      x: 0.0,
      y: 0.25,
      width: 1.0,
      height: 0.5,
    };
    let mapped = transform.to_source(&bbox);
    assert_eq!(mapped, BBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0 });

    // 完全落在填充区域的框被压成零高度
    let padding = BBox {
      x: 0.1,
      y: 0.0,
      width: 0.2,
      height: 0.1,
    };
    let mapped = transform.to_source(&padding);
    assert_eq!(mapped.y, 0.0);
    assert_eq!(mapped.height, 0.0);
  }
}
