// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
  rect::Rect,
};
use serde::Serialize;

use crate::{
  input::AsNhwcFrame,
  model::{BBox, DetectResult},
};

const BOX_THICKNESS: u32 = 2;
/// 框左上角的类别色块边长
const TAG_SIZE: u32 = 8;

/// 按类别序号取色，与类别表顺序一致
const PALETTE: [[u8; 3]; 6] = [
  [255, 178, 29],  // saung_instrument
  [56, 56, 255],   // left_hand
  [255, 56, 56],   // right_hand
  [72, 249, 10],   // left_thumb
  [255, 157, 151], // right_thumb
  [207, 210, 49],  // plucking_finger
];

pub trait ToRgbImage {
  /// 数据长度与宽高不符时返回 `None`
  fn to_rgb_image(&self) -> Option<RgbImage>;
}

impl<F: AsNhwcFrame + ?Sized> ToRgbImage for F {
  fn to_rgb_image(&self) -> Option<RgbImage> {
    RgbImage::from_raw(self.width(), self.height(), self.as_nhwc().to_vec())
  }
}

pub struct Draw {
  thickness: u32,
  palette: Box<[[u8; 3]]>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      palette: Box::new(PALETTE),
    }
  }
}

impl Draw {
  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    Rgb(self.palette[class_id as usize % self.palette.len()])
  }

  /// 在图像上绘制一个归一化坐标的矩形边框
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = (bbox.x * w).floor().clamp(0.0, w - 1.0) as i32;
    let y_min = (bbox.y * h).floor().clamp(0.0, h - 1.0) as i32;
    let x_max = (bbox.right() * w).ceil().clamp(0.0, w - 1.0) as i32;
    let y_max = (bbox.bottom() * h).ceil().clamp(0.0, h - 1.0) as i32;

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.thickness as i32 {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let tag = Rect::at(x_min, y_min).of_size(
      TAG_SIZE.min((x_max - x_min) as u32),
      TAG_SIZE.min((y_max - y_min) as u32),
    );
    draw_filled_rect_mut(image, tag, color);
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    for (item, bbox) in result.source_boxes() {
      self.draw_bbox(image, &bbox, self.color(item.class_id));
    }
  }

  pub fn draw_detection<F: ToRgbImage + ?Sized>(&self, frame: &F, result: &DetectResult) -> Option<RgbImage> {
    let mut image = frame.to_rgb_image()?;
    self.draw_detections_on_image(&mut image, result);
    Some(image)
  }
}

#[derive(Serialize)]
struct RecordItem<'a> {
  class_id: u32,
  label: &'a str,
  confidence: f32,
  bbox: BBox,
}

#[derive(Serialize)]
struct RecordFile<'a> {
  image: &'a str,
  width: u32,
  height: u32,
  status: crate::model::CycleStatus,
  detections: Vec<RecordItem<'a>>,
}

/// 将检测结果以 JSON 写在图片旁边，坐标为源图像归一化坐标
pub struct Record;

impl Record {
  pub fn record<F: AsNhwcFrame + ?Sized>(
    &self,
    frame: &F,
    result: &DetectResult,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let image = path
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or_default();
    let record = RecordFile {
      image,
      width: frame.width(),
      height: frame.height(),
      status: result.status,
      detections: result
        .source_boxes()
        .map(|(item, bbox)| RecordItem {
          class_id: item.class_id,
          label: &item.label,
          confidence: item.confidence,
          bbox,
        })
        .collect(),
    };

    let content = serde_json::to_string_pretty(&record).map_err(std::io::Error::other)?;
    std::fs::write(path.with_extension("json"), content)?;
    Ok(())
  }
}
