use crate::api::{ChatMessage, GenerativeClient};
use crate::catalog::{describe_for_prompt, AssetCatalog};
use crate::error::StageFailure;
use crate::events::Reporter;
use crate::script::{parse_script, Script};

const OUTPUT_SHAPE: &str = r#"只返回一个 JSON 对象，格式如下：
{
  "title": "项目标题",
  "characters": [{"id": "c1", "name": "角色名", "visual_prompt": "英文形象描述，全身，纯色背景"}],
  "environments": [{"id": "e1", "name": "场景名", "visual_prompt": "英文环境描述，无人物"}],
  "scenes": [
    {
      "id": 1,
      "char_ids": ["c1"],
      "env_id": "e1",
      "shot_type": "Wide Shot | Medium Shot | Close-up | ...",
      "desc": "中文分镜描述",
      "action_prompt": "英文画面与动作描述，用于生成画面和视频"
    }
  ]
}
分镜 id 从 1 开始连续编号，每个分镜必须有 action_prompt。"#;

/// 构造剧本规划的系统提示词
fn system_prompt(catalog: &AssetCatalog) -> String {
    let mut prompt = String::from(
        "你是一名分镜导演。根据用户给出的故事梗概，设计角色、场景，并拆分为有序的分镜。\n",
    );

    let listing = describe_for_prompt(catalog);
    if !listing.is_empty() {
        prompt.push_str("\n用户已提供以下自定义素材。相关时请直接复用它们的 id，不要另起新 id：\n");
        prompt.push_str(&listing);
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_SHAPE);
    prompt
}

pub fn planning_messages(topic: &str, catalog: &AssetCatalog) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(catalog)),
        ChatMessage::user(format!("故事梗概：{}", topic)),
    ]
}

/// 把主题拆成剧本
///
/// 调用失败或输出不符合剧本结构时，回退到固定的演示剧本并记一条警告，
/// 因此这里永远不会阻塞后续阶段。
pub async fn plan_script(
    client: &dyn GenerativeClient,
    topic: &str,
    catalog: &AssetCatalog,
    reporter: &Reporter,
) -> Script {
    reporter.info(format!("📝 Planning script for: {}", topic));

    let messages = planning_messages(topic, catalog);
    let planned = client
        .text_complete(&messages, true)
        .await
        .and_then(|raw| parse_script(&raw));

    match planned {
        Ok(script) => {
            reporter.info(format!(
                "📝 Script \"{}\": {} characters, {} environments, {} scenes",
                script.title,
                script.characters.len(),
                script.environments.len(),
                script.scenes.len()
            ));
            script
        }
        Err(e) => {
            reporter.warn(
                StageFailure::Planning,
                format!("script planning failed ({}), using demo script", e),
            );
            Script::demo()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssetKind, CustomAsset};

    #[test]
    fn system_prompt_lists_reusable_assets_only() {
        let mut catalog = AssetCatalog::new();
        catalog.insert(CustomAsset::new(
            "hero",
            AssetKind::Character,
            "Mia",
            "https://a/m.png",
            "short hair",
        ));
        catalog.insert(CustomAsset::new(
            "ruler",
            AssetKind::ScaleRef,
            "Ruler",
            "https://a/r.png",
            "ruler",
        ));

        let messages = planning_messages("a heist", &catalog);
        let system = messages[0].text();
        assert!(system.contains("Mia (id: hero): short hair"));
        assert!(!system.contains("ruler"));
        assert!(system.contains("action_prompt"));
        assert!(messages[1].text().contains("a heist"));
    }

    #[test]
    fn empty_catalog_has_no_asset_section() {
        let system = system_prompt(&AssetCatalog::new());
        assert!(!system.contains("自定义素材"));
    }
}
