//! # HTML 抽出
//!
//! キャンペーンの HTML 本文を doctype / head / body の中身 / body の属性に分解する。
//! 分解した部品はテンプレートの `html_*` 変数に渡され、クライアントの HTML を
//! 既定レイアウトに差し込めるようにする。

use hikyaku_domain::delivery::{HtmlExtractError, HtmlParts};
use regex::Regex;
use scraper::{Html, Selector};

/// HTML 抽出トレイト
pub trait HtmlExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Result<HtmlParts, HtmlExtractError>;
}

/// scraper（html5ever）による実装
///
/// html5ever はエラー回復するパーサーのため、断片的な HTML でも
/// `<html><head></head><body>…</body></html>` に補完して解析する。
pub struct ScraperHtmlExtractor {
    doctype: Regex,
    head:    Selector,
    body:    Selector,
}

impl ScraperHtmlExtractor {
    pub fn new() -> Result<Self, HtmlExtractError> {
        Ok(Self {
            doctype: Regex::new(r"(?i)^\s*(<!DOCTYPE[^>]*>)")
                .map_err(|e| HtmlExtractError(e.to_string()))?,
            head:    Selector::parse("head").map_err(|e| HtmlExtractError(e.to_string()))?,
            body:    Selector::parse("body").map_err(|e| HtmlExtractError(e.to_string()))?,
        })
    }
}

impl HtmlExtractor for ScraperHtmlExtractor {
    fn extract(&self, html: &str) -> Result<HtmlParts, HtmlExtractError> {
        if html.trim().is_empty() {
            return Ok(HtmlParts::default());
        }

        let doctype = self
            .doctype
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let document = Html::parse_document(html);
        let head = document
            .select(&self.head)
            .next()
            .map(|head| head.inner_html())
            .unwrap_or_default();
        let body = document
            .select(&self.body)
            .next()
            .ok_or_else(|| HtmlExtractError("body 要素がありません".to_string()))?;
        let body_attributes = body
            .value()
            .attrs()
            .map(|(name, value)| format!(r#"{name}="{value}""#))
            .collect::<Vec<_>>()
            .join(" ");

        Ok(HtmlParts {
            body_content: body.inner_html().trim().to_string(),
            body_attributes,
            head: head.trim().to_string(),
            doctype,
        })
    }
}
