//! 用户上传的自定义素材
//!
//! 素材在运行之外由“上传 + 识别”流程写入，可以替代生成的角色图、环境图；
//! 比例参考图会附加到每个分镜的参考图里。

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{strip_code_fence, ChatMessage, GenerativeClient};
use crate::error::{CineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Character,
    Environment,
    ScaleRef,
}

impl AssetKind {
    fn label(self) -> &'static str {
        match self {
            AssetKind::Character => "角色",
            AssetKind::Environment => "场景",
            AssetKind::ScaleRef => "比例参考",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetKind::Character => "character",
            AssetKind::Environment => "environment",
            AssetKind::ScaleRef => "scale_ref",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Pending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAsset {
    pub id: String,
    pub kind: AssetKind,
    pub name: String,
    pub image_ref: String,
    pub description: String,
    pub analysis_state: AnalysisState,
}

impl CustomAsset {
    /// 直接构造一个已识别完成的素材
    pub fn new(
        id: impl Into<String>,
        kind: AssetKind,
        name: impl Into<String>,
        image_ref: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            image_ref: image_ref.into(),
            description: description.into(),
            analysis_state: AnalysisState::Done,
        }
    }

    /// 刚上传、尚未识别的素材，分类暂定为角色
    pub fn pending(name: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            id: new_asset_id(),
            kind: AssetKind::Character,
            name: name.into(),
            image_ref: image_ref.into(),
            description: String::new(),
            analysis_state: AnalysisState::Pending,
        }
    }
}

/// 素材目录，保持插入顺序
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetCatalog {
    assets: Vec<CustomAsset>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入素材；同 id 已存在时整体替换
    pub fn insert(&mut self, asset: CustomAsset) {
        match self.assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => *existing = asset,
            None => self.assets.push(asset),
        }
    }

    pub fn get(&self, id: &str) -> Option<&CustomAsset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<CustomAsset> {
        let pos = self.assets.iter().position(|a| a.id == id)?;
        Some(self.assets.remove(pos))
    }

    /// 修改素材分类，这是素材唯一允许的修改
    pub fn reclassify(&mut self, id: &str, kind: AssetKind) -> Result<()> {
        let asset = self
            .assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CineError::UnknownAsset(id.to_string()))?;
        asset.kind = kind;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomAsset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// 剧本规划可见的素材（排除比例参考）
    pub fn prompt_assets(&self) -> impl Iterator<Item = &CustomAsset> {
        self.assets.iter().filter(|a| a.kind != AssetKind::ScaleRef)
    }

    pub fn scale_refs(&self) -> impl Iterator<Item = &CustomAsset> {
        self.assets.iter().filter(|a| a.kind == AssetKind::ScaleRef)
    }
}

/// 生成素材 id
pub fn new_asset_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("asset_{}", &id[..8])
}

#[derive(Debug, Deserialize)]
struct AssetAnalysis {
    #[serde(rename = "type")]
    kind: AssetKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
}

const ANALYSIS_PROMPT: &str = r#"你是影视美术助理。请观察这张图片并判断它属于哪一类素材：
- character：人物或角色形象
- environment：场景、地点或背景
- scale_ref：用于表现尺寸比例的参照物

只返回 JSON：{"type": "character|environment|scale_ref", "name": "简短名称", "description": "一句话的英文视觉描述"}"#;

/// 识别一张已登记为 pending 的素材
///
/// 用带视觉的文本补全判断分类，返回识别完成的副本；失败时返回错误，
/// 调用方手里的素材保持 pending。
pub async fn analyze_asset(
    client: &dyn GenerativeClient,
    asset: &CustomAsset,
) -> Result<CustomAsset> {
    let messages = [
        ChatMessage::system(ANALYSIS_PROMPT),
        ChatMessage::user(format!("素材名称：{}", asset.name)).with_image(asset.image_ref.as_str()),
    ];

    let analysis = client
        .text_complete(&messages, true)
        .await
        .and_then(|raw| {
            serde_json::from_str::<AssetAnalysis>(strip_code_fence(&raw)).map_err(CineError::from)
        });
    let analysis = match analysis {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Asset analysis failed for {}: {}", asset.name, e);
            return Err(e);
        }
    };

    // 用户给的名称优先，留空时才用模型起的名字
    let name = match analysis.name {
        Some(suggested) if asset.name.trim().is_empty() && !suggested.trim().is_empty() => {
            suggested
        }
        _ => asset.name.clone(),
    };

    info!("Asset {} classified as {} ({})", asset.id, analysis.kind, analysis.kind.label());
    Ok(CustomAsset {
        id: asset.id.clone(),
        kind: analysis.kind,
        name,
        image_ref: asset.image_ref.clone(),
        description: analysis.description,
        analysis_state: AnalysisState::Done,
    })
}

/// 给剧本规划用的素材清单
pub fn describe_for_prompt(catalog: &AssetCatalog) -> String {
    catalog
        .prompt_assets()
        .map(|a| {
            format!(
                "- [{}] {} (id: {}): {}",
                a.kind.label(),
                a.name,
                a.id,
                a.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetCatalog {
        let mut catalog = AssetCatalog::new();
        catalog.insert(CustomAsset::new(
            "c1",
            AssetKind::Character,
            "Alice",
            "https://a/c1.png",
            "red hair",
        ));
        catalog.insert(CustomAsset::new(
            "s1",
            AssetKind::ScaleRef,
            "Ruler",
            "https://a/s1.png",
            "1m ruler",
        ));
        catalog.insert(CustomAsset::new(
            "e1",
            AssetKind::Environment,
            "Forest",
            "https://a/e1.png",
            "pines",
        ));
        catalog
    }

    #[test]
    fn prompt_assets_exclude_scale_refs() {
        let catalog = sample();
        let ids: Vec<_> = catalog.prompt_assets().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "e1"]);
        let scale: Vec<_> = catalog.scale_refs().map(|a| a.id.as_str()).collect();
        assert_eq!(scale, vec!["s1"]);

        let listing = describe_for_prompt(&catalog);
        assert!(listing.contains("id: c1"));
        assert!(listing.contains("id: e1"));
        assert!(!listing.contains("s1"));
    }

    #[test]
    fn reclassify_and_remove() {
        let mut catalog = sample();
        catalog.reclassify("c1", AssetKind::ScaleRef).unwrap();
        assert_eq!(catalog.scale_refs().count(), 2);
        assert!(matches!(
            catalog.reclassify("missing", AssetKind::Character),
            Err(CineError::UnknownAsset(_))
        ));
        assert_eq!(catalog.remove("e1").map(|a| a.name), Some("Forest".to_string()));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn asset_ids_are_prefixed() {
        let id = new_asset_id();
        assert!(id.starts_with("asset_"));
        assert_eq!(id.len(), "asset_".len() + 8);
    }
}
