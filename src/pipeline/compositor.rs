use serde::Serialize;
use tracing::debug;

use crate::api::GenerativeClient;
use crate::catalog::AssetCatalog;
use crate::error::StageFailure;
use crate::events::Reporter;
use crate::script::SceneDef;

use super::{placeholder_url, AssetImages, Frame, FrameOrigin};

const FRAME_PLACEHOLDER_SIZE: &str = "1280x720";

/// 一致性锚点：最近一张真正生成成功的分镜画面
///
/// 只接受 `Generated` 画面，占位图永远不会进入链条。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyAnchor(Option<String>);

impl ConsistencyAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// 用新画面推进锚点，返回是否更新
    pub fn observe(&mut self, frame: &Frame) -> bool {
        match frame.origin {
            FrameOrigin::Generated => {
                self.0 = Some(frame.url.clone());
                true
            }
            FrameOrigin::Placeholder => false,
        }
    }

    pub fn reset(&mut self) {
        self.0 = None;
    }
}

/// 组装分镜的参考图列表
///
/// 顺序固定：锚点（开启一致性且存在时）、环境图、按列出顺序的角色图、全部比例参考图。
/// 顺序代表合成优先级。
pub fn build_references(
    scene: &SceneDef,
    images: &AssetImages,
    catalog: &AssetCatalog,
    anchor: Option<&str>,
    consistency: bool,
) -> Vec<String> {
    // 剧本未定义但目录中存在的 id 直接取素材原图
    let lookup = |id: &str| -> Option<String> {
        images
            .get(id)
            .map(|img| img.url.clone())
            .or_else(|| catalog.get(id).map(|a| a.image_ref.clone()))
    };

    let mut refs = Vec::new();
    if consistency {
        if let Some(url) = anchor {
            refs.push(url.to_string());
        }
    }

    if let Some(env_id) = scene.env_id.as_deref() {
        match lookup(env_id) {
            Some(url) => refs.push(url),
            None => debug!("Scene {}: no image for environment {}", scene.id, env_id),
        }
    }

    for char_id in &scene.char_ids {
        match lookup(char_id) {
            Some(url) => refs.push(url),
            None => debug!("Scene {}: no image for character {}", scene.id, char_id),
        }
    }

    refs.extend(catalog.scale_refs().map(|a| a.image_ref.clone()));
    refs
}

/// 生成单个分镜画面，失败时返回占位画面
///
/// 锚点的推进由调用方通过 [`ConsistencyAnchor::observe`] 完成。
pub async fn render_frame(
    client: &dyn GenerativeClient,
    scene: &SceneDef,
    references: &[String],
    reporter: &Reporter,
) -> Frame {
    match client.image_generate(&scene.action_prompt, references).await {
        Ok(url) => {
            reporter.info(format!(
                "🎬 Scene {} composed ({}, {} references)",
                scene.id,
                scene.shot_type,
                references.len()
            ));
            Frame {
                scene_id: scene.id,
                url,
                origin: FrameOrigin::Generated,
            }
        }
        Err(e) => {
            reporter.warn(
                StageFailure::Composition,
                format!("scene {} fell back to placeholder: {}", scene.id, e),
            );
            Frame {
                scene_id: scene.id,
                url: placeholder_url(FRAME_PLACEHOLDER_SIZE, &format!("Scene {}", scene.id)),
                origin: FrameOrigin::Placeholder,
            }
        }
    }
}
