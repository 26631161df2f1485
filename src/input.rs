// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/input.rs - 视频/图像输入
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

/// 可读取当前画面的图像源（交错 RGB8）
pub trait AsNhwcFrame {
  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn as_nhwc(&self) -> &[u8];

  /// 宽或高为 0 时输入源尚未就绪（视频未加载、跳转中等）
  fn is_ready(&self) -> bool {
    self.width() > 0 && self.height() > 0
  }
}

impl<T: AsNhwcFrame + ?Sized> AsNhwcFrame for &T {
  fn width(&self) -> u32 {
    (**self).width()
  }

  fn height(&self) -> u32 {
    (**self).height()
  }

  fn as_nhwc(&self) -> &[u8] {
    (**self).as_nhwc()
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_image_file")]
mod read_image_folder;
#[cfg(feature = "read_image_file")]
pub use self::read_image_folder::{ImageFolderInput, ImageFolderInputError};

#[cfg(feature = "read_image_file")]
pub use self::wrapper::{InputError, InputWrapper};

#[cfg(feature = "read_image_file")]
mod wrapper {
  use thiserror::Error;

  use super::{ImageFileInput, ImageFileInputError, ImageFolderInput, ImageFolderInputError};
  use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

  #[derive(Error, Debug)]
  pub enum InputError {
    #[error("Image file input error: {0}")]
    ImageFileInputError(#[from] ImageFileInputError),
    #[error("Image folder input error: {0}")]
    ImageFolderInputError(#[from] ImageFolderInputError),
    #[error("URI scheme mismatch: {0}")]
    SchemeMismatch(String),
  }

  pub enum InputWrapper {
    ReadImageFile(ImageFileInput),
    ReadImageFolder(ImageFolderInput),
  }

  impl FromUrl for InputWrapper {
    type Error = InputError;

    fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
      match url.scheme() {
        ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
        ImageFolderInput::SCHEME => Ok(InputWrapper::ReadImageFolder(
          ImageFolderInput::from_url(url)?,
        )),
        other => Err(InputError::SchemeMismatch(other.to_string())),
      }
    }
  }

  impl Iterator for InputWrapper {
    type Item = RgbNhwcFrame;

    fn next(&mut self) -> Option<Self::Item> {
      match self {
        InputWrapper::ReadImageFile(input) => input.next(),
        InputWrapper::ReadImageFolder(input) => input.next(),
      }
    }
  }
}
