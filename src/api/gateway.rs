use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{extract_media_url, ChatMessage, ContentPart, GenerativeClient, Role};
use crate::error::{CineError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// 网关连接配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl GatewayConfig {
    /// 从环境变量读取，缺省项使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CINEMA_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("CINEMA_API_KEY").ok().filter(|k| !k.is_empty()),
            text_model: std::env::var("CINEMA_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: std::env::var("CINEMA_IMAGE_MODEL").unwrap_or(defaults.image_model),
            timeout: std::env::var("CINEMA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// OpenAI 兼容的对话补全网关，三种能力都走 chat/completions
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: Value,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        // 纯文本消息用字符串，带图片时用分片数组
        let content = match message.parts.as_slice() {
            [ContentPart::Text(text)] => Value::String(text.clone()),
            parts => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                        ContentPart::ImageUrl(url) => {
                            json!({ "type": "image_url", "image_url": { "url": url } })
                        }
                    })
                    .collect(),
            ),
        };
        Self {
            role: message.role,
            content,
        }
    }
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn chat(&self, model: &str, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let wire: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();

        let mut request_body = json!({
            "model": model,
            "messages": wire,
        });
        if json_mode {
            request_body["response_format"] = json!({ "type": "json_object" });
        }

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!("POST {} (model={})", url, model);
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CineError::ApiError(format!(
                "gateway returned {}: {}",
                status, error_text
            )));
        }

        let response_json: Value = response.json().await?;

        // 提取生成的文本
        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CineError::ApiError("Failed to extract generated text".to_string()))
    }
}

#[async_trait]
impl GenerativeClient for GatewayClient {
    async fn text_complete(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        self.chat(&self.config.text_model, messages, json_mode).await
    }

    async fn image_generate(
        &self,
        prompt: &str,
        reference_image_urls: &[String],
    ) -> Result<String> {
        info!(
            "Generating image with {} reference(s): {}",
            reference_image_urls.len(),
            prompt
        );

        let message = reference_image_urls
            .iter()
            .fold(ChatMessage::user(prompt), |m, url| m.with_image(url.as_str()));

        let reply = self
            .chat(&self.config.image_model, std::slice::from_ref(&message), false)
            .await?;
        extract_media_url(&reply)
    }

    async fn video_generate(
        &self,
        model: &str,
        prompt: &str,
        start_image_url: &str,
    ) -> Result<String> {
        info!("Generating video with {}: {}", model, prompt);

        let message = ChatMessage::user(prompt).with_image(start_image_url);
        let reply = self.chat(model, std::slice::from_ref(&message), false).await?;
        extract_media_url(&reply)
    }
}
