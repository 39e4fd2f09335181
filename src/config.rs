//! 流水线配置

use crate::error::Result;
use crate::video::VideoConfig;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 是否把上一张成功画面作为下一个分镜的参考图
    pub consistency: bool,
    /// 完整运行时是否为每个分镜生成视频
    pub generate_videos: bool,
    pub video: VideoConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consistency: true,
            generate_videos: false,
            video: VideoConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.video.validate()
    }
}
