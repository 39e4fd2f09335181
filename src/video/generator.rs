use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::api::GenerativeClient;
use crate::error::{CineError, Result, StageFailure};
use crate::events::Reporter;
use crate::pipeline::{Clip, Frame};
use crate::script::SceneDef;

const MAX_DURATION_SECS: u32 = 20;

/// 支持的视频模型
///
/// 参数型模型通过提示词后缀接收分辨率和时长，其余模型追加画面修饰语。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoModel {
    Sora2,
    Wan22,
    Veo3Fast,
    Kling21,
}

impl VideoModel {
    pub fn model_id(self) -> &'static str {
        match self {
            VideoModel::Sora2 => "sora-2",
            VideoModel::Wan22 => "wan-2.2",
            VideoModel::Veo3Fast => "veo3-fast",
            VideoModel::Kling21 => "kling-2.1",
        }
    }

    pub fn uses_parameters(self) -> bool {
        matches!(self, VideoModel::Sora2 | VideoModel::Wan22)
    }
}

impl fmt::Display for VideoModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

impl FromStr for VideoModel {
    type Err = CineError;

    fn from_str(s: &str) -> Result<Self> {
        [
            VideoModel::Sora2,
            VideoModel::Wan22,
            VideoModel::Veo3Fast,
            VideoModel::Kling21,
        ]
        .into_iter()
        .find(|m| m.model_id().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| CineError::ConfigError(format!("unknown video model: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        };
        f.write_str(s)
    }
}

impl FromStr for Resolution {
    type Err = CineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "480p" | "480" => Ok(Resolution::P480),
            "720p" | "720" => Ok(Resolution::P720),
            "1080p" | "1080" => Ok(Resolution::P1080),
            other => Err(CineError::ConfigError(format!("unknown resolution: {}", other))),
        }
    }
}

/// 运行级别的视频配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoConfig {
    pub model: VideoModel,
    pub resolution: Option<Resolution>,
    pub duration_secs: Option<u32>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            model: VideoModel::Veo3Fast,
            resolution: Some(Resolution::P720),
            duration_secs: Some(8),
        }
    }
}

impl VideoConfig {
    /// 参数型模型必须给出分辨率和 1..=20 秒的时长
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.duration_secs {
            if d == 0 || d > MAX_DURATION_SECS {
                return Err(CineError::ConfigError(format!(
                    "video duration must be 1..={} seconds, got {}",
                    MAX_DURATION_SECS, d
                )));
            }
        }
        if self.model.uses_parameters()
            && (self.resolution.is_none() || self.duration_secs.is_none())
        {
            return Err(CineError::ConfigError(format!(
                "{} requires both resolution and duration",
                self.model
            )));
        }
        Ok(())
    }
}

/// 根据模型拼接最终提示词
pub fn build_video_prompt(action_prompt: &str, config: &VideoConfig) -> String {
    let base = action_prompt.trim();
    if config.model.uses_parameters() {
        let mut prompt = base.to_string();
        if let Some(resolution) = config.resolution {
            prompt.push_str(&format!(" --resolution {}", resolution));
        }
        if let Some(duration) = config.duration_secs {
            prompt.push_str(&format!(" --duration {}s", duration));
        }
        prompt
    } else {
        format!(
            "{}, cinematic camera movement, smooth natural motion, consistent with the first frame",
            base
        )
    }
}

/// 用分镜画面和动作描述生成视频片段
///
/// 不区分画面来源，占位画面也照常作为首帧。失败时返回 `None` 并记录日志。
pub async fn generate_clip(
    client: &dyn GenerativeClient,
    scene: &SceneDef,
    frame: &Frame,
    config: &VideoConfig,
    reporter: &Reporter,
) -> Option<Clip> {
    let prompt = build_video_prompt(&scene.action_prompt, config);
    reporter.info(format!("🎥 Generating video for scene {} with {}", scene.id, config.model));

    match client
        .video_generate(config.model.model_id(), &prompt, &frame.url)
        .await
    {
        Ok(url) => {
            reporter.info(format!("🎥 Scene {} video ready", scene.id));
            Some(Clip {
                scene_id: scene.id,
                url,
            })
        }
        Err(e) => {
            reporter.warn(
                StageFailure::Video,
                format!("scene {} video generation failed: {}", scene.id, e),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_models_get_suffixes() {
        let config = VideoConfig {
            model: VideoModel::Sora2,
            resolution: Some(Resolution::P1080),
            duration_secs: Some(10),
        };
        assert_eq!(
            build_video_prompt("a cat jumps ", &config),
            "a cat jumps --resolution 1080p --duration 10s"
        );
    }

    #[test]
    fn other_models_get_qualifiers() {
        let config = VideoConfig {
            model: VideoModel::Kling21,
            resolution: None,
            duration_secs: None,
        };
        let prompt = build_video_prompt("a cat jumps", &config);
        assert!(prompt.starts_with("a cat jumps, cinematic camera movement"));
        assert!(!prompt.contains("--"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rules() {
        assert!(VideoConfig::default().validate().is_ok());

        let missing = VideoConfig {
            model: VideoModel::Wan22,
            resolution: None,
            duration_secs: Some(5),
        };
        assert!(matches!(missing.validate(), Err(CineError::ConfigError(_))));

        let too_long = VideoConfig {
            duration_secs: Some(30),
            ..VideoConfig::default()
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn parses_models_and_resolutions() {
        assert_eq!("SORA-2".parse::<VideoModel>().unwrap(), VideoModel::Sora2);
        assert!("dall-e".parse::<VideoModel>().is_err());
        assert_eq!("720".parse::<Resolution>().unwrap(), Resolution::P720);
    }
}
