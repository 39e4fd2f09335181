use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CineError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No media URL in model output: {0}")]
    ExtractionError(String),

    #[error("Script shape error: {0}")]
    ScriptShape(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown scene: {0}")]
    UnknownScene(u32),

    #[error("Scene {0} has no frame yet")]
    MissingFrame(u32),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("A full run is already in progress")]
    RunInProgress,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CineError>;

/// 各阶段在本地兜底的失败类型，只用于标记日志，不会作为错误返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFailure {
    Planning,
    AssetResolution,
    Composition,
    Video,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageFailure::Planning => "PlanningFailure",
            StageFailure::AssetResolution => "AssetResolutionFailure",
            StageFailure::Composition => "CompositionFailure",
            StageFailure::Video => "VideoFailure",
        };
        f.write_str(name)
    }
}
