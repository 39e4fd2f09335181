//! 自动分镜：把一句话的故事梗概变成视觉连贯的分镜画面和（可选的）分镜视频。
//!
//! 流水线依次调用文本、图片、视频三类生成模型，每一步都有本地兜底，
//! 单次运行总会完成。入口是 [`RunController`]。

pub mod api;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod inflight;
pub mod pipeline;
pub mod script;
pub mod video;

pub use api::{ChatMessage, GatewayClient, GatewayConfig, GenerativeClient};
pub use catalog::{AssetCatalog, AssetKind, CustomAsset};
pub use config::PipelineConfig;
pub use controller::{RunController, RunSnapshot, SceneOp};
pub use error::{CineError, Result, StageFailure};
pub use events::{LogLine, RunEvent, RunStage};
pub use pipeline::{AssetImage, AssetOrigin, Clip, Frame, FrameOrigin};
pub use script::{parse_script, Script};
pub use video::{Resolution, VideoConfig, VideoModel};
