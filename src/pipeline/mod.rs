//! 自动分镜流水线的各个阶段：剧本规划、素材落地、分镜合成
//!
//! 阶段函数本身不持有状态，状态由 [`crate::controller::RunController`] 持有并按引用传入。

pub mod compositor;
pub mod materializer;
pub mod planner;

use std::collections::BTreeMap;

use serde::Serialize;

pub use compositor::{build_references, render_frame, ConsistencyAnchor};
pub use materializer::{entities, materialize, resolve_entity, EntityRef};
pub use planner::plan_script;

const PLACEHOLDER_HOST: &str = "https://placehold.co";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetOrigin {
    Reused,
    Generated,
    Placeholder,
}

/// 角色或环境落地后的图片
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetImage {
    pub owner_id: String,
    pub url: String,
    pub origin: AssetOrigin,
}

pub type AssetImages = BTreeMap<String, AssetImage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    Generated,
    Placeholder,
}

/// 分镜画面；每个分镜同时只有一张当前画面
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub scene_id: u32,
    pub url: String,
    pub origin: FrameOrigin,
}

/// 视频片段，只在生成成功后存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clip {
    pub scene_id: u32,
    pub url: String,
}

/// 生成失败时的占位图，URL 只由尺寸和文字决定
pub fn placeholder_url(size: &str, label: &str) -> String {
    format!(
        "{}/{}/png?text={}",
        PLACEHOLDER_HOST,
        size,
        urlencoding::encode(label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_deterministic_and_encodes_label() {
        let a = placeholder_url("1024x1024", "红衣 少女");
        let b = placeholder_url("1024x1024", "红衣 少女");
        assert_eq!(a, b);
        assert!(a.starts_with("https://placehold.co/1024x1024/png?text="));
        assert!(!a.contains(' '));
        assert_ne!(a, placeholder_url("1024x1024", "Knight"));
    }
}
