//! 运行日志与进度事件
//!
//! 日志只追加不修改；每条日志同时写入 tracing。界面可以订阅事件流，
//! 也可以轮询控制器的快照。

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::StageFailure;
use crate::pipeline::{AssetImage, Clip, Frame};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// 整体运行阶段，完整运行时只会向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    PlanningScript,
    MaterializingAssets,
    CompositingScenes,
    GeneratingVideos,
    Done,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(LogLine),
    Stage(RunStage),
    Asset(AssetImage),
    Frame(Frame),
    Clip(Clip),
}

/// 日志与事件的发布端，各阶段函数只拿到它的引用
#[derive(Debug)]
pub struct Reporter {
    lines: Mutex<Vec<LogLine>>,
    events: broadcast::Sender<RunEvent>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            lines: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// 没有订阅者时事件直接丢弃
    pub fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, failure: StageFailure, message: impl Into<String>) {
        let message = format!("⚠️ [{}] {}", failure, message.into());
        warn!("{}", message);
        self.push(LogLevel::Warn, message);
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.guard().clone()
    }

    /// 新一轮完整运行开始时清空日志
    pub fn clear(&self) {
        self.guard().clear();
    }

    fn push(&self, level: LogLevel, message: String) {
        let line = LogLine {
            at: Local::now(),
            level,
            message,
        };
        self.guard().push(line.clone());
        self.emit(RunEvent::Log(line));
    }

    // 锁中毒时日志仍然完整，继续使用
    fn guard(&self) -> MutexGuard<'_, Vec<LogLine>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
