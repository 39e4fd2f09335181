use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::api::strip_code_fence;
use crate::error::{CineError, Result};

/// 角色定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDef {
    pub id: String,
    pub name: String,
    /// 用于生成形象图的提示词
    #[serde(alias = "visualPrompt")]
    pub visual_prompt: String,
}

/// 场景环境定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDef {
    pub id: String,
    pub name: String,
    #[serde(alias = "visualPrompt")]
    pub visual_prompt: String,
}

/// 一个分镜
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDef {
    /// 分镜序号
    pub id: u32,
    #[serde(default, alias = "charIds", alias = "characters")]
    pub char_ids: Vec<String>,
    #[serde(default, alias = "envId")]
    pub env_id: Option<String>,
    #[serde(default, alias = "shotType")]
    pub shot_type: String,
    #[serde(default, alias = "description")]
    pub desc: String,
    #[serde(alias = "actionPrompt")]
    pub action_prompt: String,
}

/// 规划阶段产出的完整剧本，生成后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    #[serde(default)]
    pub characters: Vec<CharacterDef>,
    #[serde(default)]
    pub environments: Vec<EnvironmentDef>,
    pub scenes: Vec<SceneDef>,
}

impl Script {
    /// 规划失败时使用的固定演示剧本
    pub fn demo() -> Self {
        Self {
            title: "演示项目".to_string(),
            characters: vec![CharacterDef {
                id: "c1".to_string(),
                name: "旅行者".to_string(),
                visual_prompt: "A young traveler in a hooded cloak, full body, neutral background"
                    .to_string(),
            }],
            environments: vec![EnvironmentDef {
                id: "e1".to_string(),
                name: "山间小镇".to_string(),
                visual_prompt: "A quiet mountain village at dawn, wide establishing view"
                    .to_string(),
            }],
            scenes: vec![SceneDef {
                id: 1,
                char_ids: vec!["c1".to_string()],
                env_id: Some("e1".to_string()),
                shot_type: "Wide Shot".to_string(),
                desc: "旅行者走进清晨的小镇".to_string(),
                action_prompt: "The traveler walks slowly into the village as morning mist lifts"
                    .to_string(),
            }],
        }
    }

    pub fn scene(&self, id: u32) -> Option<&SceneDef> {
        self.scenes.iter().find(|s| s.id == id)
    }
}

/// 解析模型输出的剧本 JSON
///
/// 会先去掉代码块包裹；分镜按 id 升序排列。分镜为空、分镜 id 重复、
/// 角色或环境 id 为空或重复都视为形状错误。
pub fn parse_script(raw: &str) -> Result<Script> {
    let mut script: Script = serde_json::from_str(strip_code_fence(raw))?;

    if script.scenes.is_empty() {
        return Err(CineError::ScriptShape("script has no scenes".to_string()));
    }

    let mut seen = HashSet::new();
    for scene in &script.scenes {
        if !seen.insert(scene.id) {
            return Err(CineError::ScriptShape(format!("duplicate scene id {}", scene.id)));
        }
        if scene.action_prompt.trim().is_empty() {
            return Err(CineError::ScriptShape(format!(
                "scene {} has an empty action_prompt",
                scene.id
            )));
        }
    }

    // 角色和环境共用一个 id 空间
    let mut entity_ids = HashSet::new();
    let ids = script
        .characters
        .iter()
        .map(|c| c.id.as_str())
        .chain(script.environments.iter().map(|e| e.id.as_str()));
    for id in ids {
        if id.trim().is_empty() {
            return Err(CineError::ScriptShape(
                "character or environment with empty id".to_string(),
            ));
        }
        if !entity_ids.insert(id) {
            return Err(CineError::ScriptShape(format!("duplicate entity id {}", id)));
        }
    }

    // 空字符串的环境引用视为未设置
    for scene in &mut script.scenes {
        if scene.env_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            scene.env_id = None;
        }
    }
    script.scenes.sort_by_key(|s| s.id);
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"```json
{
  "title": "雨夜",
  "characters": [{"id": "c1", "name": "侦探", "visual_prompt": "detective in trench coat"}],
  "environments": [{"id": "e1", "name": "街道", "visual_prompt": "rainy neon street"}],
  "scenes": [
    {"id": 2, "char_ids": ["c1"], "env_id": "e1", "shot_type": "Close-up", "desc": "d2", "action_prompt": "he looks up"},
    {"id": 1, "char_ids": ["c1"], "env_id": "", "shot_type": "Wide", "desc": "d1", "action_prompt": "he walks"}
  ]
}
```"#;

    #[test]
    fn parses_fenced_script_and_orders_scenes() {
        let script = parse_script(RAW).unwrap();
        assert_eq!(script.title, "雨夜");
        assert_eq!(script.scenes.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(script.scenes[0].env_id, None);
        assert_eq!(script.scenes[1].env_id.as_deref(), Some("e1"));
        assert_eq!(script.environments[0].name, "街道");
    }

    #[test]
    fn accepts_camel_case_keys() {
        let raw = r#"{"title":"t","scenes":[{"id":1,"charIds":["a"],"envId":"b","shotType":"Wide","actionPrompt":"go"}]}"#;
        let script = parse_script(raw).unwrap();
        assert_eq!(script.scenes[0].char_ids, vec!["a".to_string()]);
        assert_eq!(script.scenes[0].shot_type, "Wide");
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(matches!(parse_script("not json"), Err(CineError::JsonError(_))));
        assert!(matches!(
            parse_script(r#"{"title":"t","scenes":[]}"#),
            Err(CineError::ScriptShape(_))
        ));
        assert!(matches!(
            parse_script(
                r#"{"title":"t","scenes":[{"id":1,"action_prompt":"a"},{"id":1,"action_prompt":"b"}]}"#
            ),
            Err(CineError::ScriptShape(_))
        ));
        // 缺少 action_prompt
        assert!(parse_script(r#"{"title":"t","scenes":[{"id":1}]}"#).is_err());
    }

    #[test]
    fn rejects_duplicate_entity_ids() {
        let entity = |id: &str| format!(r#"{{"id":"{id}","name":"n","visual_prompt":"p"}}"#);
        let script = |characters: Vec<String>, environments: Vec<String>| {
            format!(
                r#"{{"title":"t","characters":[{}],"environments":[{}],"scenes":[{{"id":1,"action_prompt":"a"}}]}}"#,
                characters.join(","),
                environments.join(",")
            )
        };

        let cases = [
            script(vec![entity("c1"), entity("c1")], vec![]),
            script(vec![], vec![entity("e1"), entity("e1")]),
            script(vec![entity("x")], vec![entity("x")]),
        ];
        for raw in &cases {
            assert!(
                matches!(parse_script(raw), Err(CineError::ScriptShape(_))),
                "accepted {raw}"
            );
        }
        assert!(parse_script(&script(vec![entity("c1")], vec![entity("e1")])).is_ok());
    }

    #[test]
    fn demo_script_has_one_of_each() {
        let demo = Script::demo();
        assert_eq!(demo.title, "演示项目");
        assert_eq!(demo.characters.len(), 1);
        assert_eq!(demo.environments.len(), 1);
        assert_eq!(demo.scenes.len(), 1);
    }
}
