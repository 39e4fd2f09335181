use crate::api::GenerativeClient;
use crate::catalog::AssetCatalog;
use crate::error::StageFailure;
use crate::events::{Reporter, RunEvent};
use crate::script::Script;

use super::{placeholder_url, AssetImage, AssetImages, AssetOrigin};

const ASSET_PLACEHOLDER_SIZE: &str = "1024x1024";

/// 需要落地成图片的角色或环境
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub visual_prompt: &'a str,
}

/// 剧本里的全部实体，角色在前、环境在后，各自保持列表顺序
pub fn entities(script: &Script) -> Vec<EntityRef<'_>> {
    let characters = script.characters.iter().map(|c| EntityRef {
        id: &c.id,
        name: &c.name,
        visual_prompt: &c.visual_prompt,
    });
    let environments = script.environments.iter().map(|e| EntityRef {
        id: &e.id,
        name: &e.name,
        visual_prompt: &e.visual_prompt,
    });
    characters.chain(environments).collect()
}

/// 落地单个实体：目录里有同 id 素材就直接引用，否则调用生图，失败用占位图
pub async fn resolve_entity(
    client: &dyn GenerativeClient,
    entity: EntityRef<'_>,
    catalog: &AssetCatalog,
    reporter: &Reporter,
) -> AssetImage {
    if let Some(asset) = catalog.get(entity.id) {
        reporter.info(format!("🔗 direct reference: {} ({})", entity.name, entity.id));
        return AssetImage {
            owner_id: entity.id.to_string(),
            url: asset.image_ref.clone(),
            origin: AssetOrigin::Reused,
        };
    }

    match client.image_generate(entity.visual_prompt, &[]).await {
        Ok(url) => {
            reporter.info(format!("🎨 AI-drawn: {} ({})", entity.name, entity.id));
            AssetImage {
                owner_id: entity.id.to_string(),
                url,
                origin: AssetOrigin::Generated,
            }
        }
        Err(e) => {
            reporter.warn(
                StageFailure::AssetResolution,
                format!("{} ({}) fell back to placeholder: {}", entity.name, entity.id, e),
            );
            AssetImage {
                owner_id: entity.id.to_string(),
                url: placeholder_url(ASSET_PLACEHOLDER_SIZE, entity.name),
                origin: AssetOrigin::Placeholder,
            }
        }
    }
}

/// 依次落地剧本中的所有角色和环境
///
/// 严格串行，每落地一个就通过 `on_resolved` 交给调用方并发布事件。
pub async fn materialize<F>(
    client: &dyn GenerativeClient,
    script: &Script,
    catalog: &AssetCatalog,
    reporter: &Reporter,
    mut on_resolved: F,
) -> AssetImages
where
    F: FnMut(&AssetImage),
{
    let mut images = AssetImages::new();
    for entity in entities(script) {
        let image = resolve_entity(client, entity, catalog, reporter).await;
        on_resolved(&image);
        reporter.emit(RunEvent::Asset(image.clone()));
        images.insert(image.owner_id.clone(), image);
    }
    images
}
