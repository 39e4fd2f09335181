mod generator;

pub use generator::{build_video_prompt, generate_clip, Resolution, VideoConfig, VideoModel};
