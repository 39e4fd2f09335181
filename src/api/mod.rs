//! 生成式模型接口：文本、图片、视频三种能力
//!
//! 客户端本身不做重试，失败直接返回，兜底策略由上层流水线决定。

mod extract;
mod gateway;

pub use extract::{extract_media_url, strip_code_fence};
pub use gateway::{GatewayClient, GatewayConfig};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// 消息内容片段，图片片段用于带视觉的文本补全
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    ImageUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// 追加一张图片附件，保持调用顺序
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.parts.push(ContentPart::ImageUrl(url.into()));
        self
    }

    /// 合并所有文本片段
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// 文本补全；`json_mode` 时返回体应为 JSON 文档（可能包裹在代码块里）
    async fn text_complete(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String>;

    /// 生成图片，参考图按给定顺序作为附件传入，返回图片 URL
    async fn image_generate(&self, prompt: &str, reference_image_urls: &[String]) -> Result<String>;

    /// 以首帧图片生成视频，返回视频 URL
    async fn video_generate(&self, model: &str, prompt: &str, start_image_url: &str)
        -> Result<String>;
}
