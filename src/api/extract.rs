use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CineError, Result};

fn markdown_image() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(\s*(https?://[^\s)]+)").expect("valid regex"))
}

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(\s*(https?://[^\s)]+)").expect("valid regex"))
}

fn bare_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s)\]"'<>]+"#).expect("valid regex"))
}

/// 清理可能的 markdown 代码块标记
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// 从模型的自由文本回复中取出媒体 URL
///
/// 依次尝试 markdown 图片、markdown 链接、裸 URL。
pub fn extract_media_url(text: &str) -> Result<String> {
    for re in [markdown_image(), markdown_link()] {
        if let Some(caps) = re.captures(text) {
            return Ok(caps[1].to_string());
        }
    }

    if let Some(m) = bare_url().find(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']);
        return Ok(url.to_string());
    }

    let preview: String = text.chars().take(120).collect();
    Err(CineError::ExtractionError(preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_markdown_image_over_other_urls() {
        let text = "See https://example.com/docs first.\n![frame](https://cdn.example.com/a.png)";
        assert_eq!(extract_media_url(text).unwrap(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn falls_back_to_link_then_bare_url() {
        assert_eq!(
            extract_media_url("[download](https://cdn.example.com/v.mp4)").unwrap(),
            "https://cdn.example.com/v.mp4"
        );
        assert_eq!(
            extract_media_url("Your video is ready: https://cdn.example.com/v.mp4.").unwrap(),
            "https://cdn.example.com/v.mp4"
        );
    }

    #[test]
    fn no_url_is_an_extraction_error() {
        let err = extract_media_url("Sorry, I cannot draw that.").unwrap_err();
        assert!(matches!(err, CineError::ExtractionError(_)));
    }

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
