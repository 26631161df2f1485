// 该文件是 Saung Detect （弹琴手势检测）项目的一部分。
// src/testing.rs - 测试用日志计数
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

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
  Registry,
  layer::{Context, Layer, SubscriberExt},
};

/// 统计指定级别的日志事件数
#[derive(Clone)]
pub struct LevelCounter {
  level: Level,
  count: Arc<AtomicUsize>,
}

impl LevelCounter {
  pub fn new(level: Level) -> Self {
    Self {
      level,
      count: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn count(&self) -> usize {
    self.count.load(Ordering::SeqCst)
  }

  /// 在只挂载本计数器的订阅者下执行 `f`
  pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
    let subscriber = Registry::default().with(self.clone());
    tracing::subscriber::with_default(subscriber, f)
  }
}

impl<S: Subscriber> Layer<S> for LevelCounter {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    if *event.metadata().level() == self.level {
      self.count.fetch_add(1, Ordering::SeqCst);
    }
  }
}
