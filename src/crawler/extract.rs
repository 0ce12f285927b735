//! Page structure extraction.
//!
//! Which markup identifies the tracked block is deployment specific and
//! brittle, so it sits behind [`PageExtractor`]. [`KinExtractor`] handles the
//! Q&A block of the mobile result page.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use super::ProcessError;

const SEARCH_ENDPOINT: &str = "https://m.search.naver.com/search.naver";

/// Mobile search result page URL for a search term.
pub fn search_url(term: &str) -> String {
    format!(
        "{}?sm=mtp_hty.top&where=m&query={}",
        SEARCH_ENDPOINT,
        urlencoding::encode(term)
    )
}

/// One entry inside a tracked block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockItem {
    pub url: String,
    pub author: String,
    pub badge: String,
}

/// What a result page says about the tracked block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultPage {
    pub block_present: bool,
    /// 1-based position among top-level result sections, 0 when absent.
    pub block_rank: i64,
    /// Items across every instance of the block, in page order.
    pub items: Vec<BlockItem>,
}

/// Fields read from a matched item's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailInfo {
    /// `YYYY.MM.DD`, empty when not found.
    pub posted_date: String,
    /// View count text as shown, empty when not found.
    pub view_count: String,
}

/// Extracts block signals and detail fields from raw HTML.
pub trait PageExtractor: Send + Sync {
    fn extract_results(&self, html: &str) -> ResultPage;

    fn extract_detail(&self, html: &str) -> DetailInfo;
}

const VIEW_MARKER: &str = "조회수";
const DATE_MARKER: &str = "작성일";
const BLOCK_ID: &str = "kin";

/// Extractor for the Q&A ("kin") block.
pub struct KinExtractor {
    block: Selector,
    section_root: Selector,
    item: Selector,
    item_url: Selector,
    item_author: Selector,
    item_badge: Selector,
    user_info: Selector,
    info_item: Selector,
    any_span: Selector,
    date: Regex,
}

fn selector(css: &str) -> Result<Selector, ProcessError> {
    Selector::parse(css).map_err(|e| ProcessError::Selector(format!("{}: {}", css, e)))
}

impl KinExtractor {
    pub fn new() -> Result<Self, ProcessError> {
        Ok(Self {
            block: selector(r#"div[data-meta-ssuid="kin"]"#)?,
            section_root: selector(r#"div[data-fender-root="true"]"#)?,
            item: selector(r#"div[data-template-id="kinItem"]"#)?,
            item_url: selector("button._keep_trigger")?,
            item_author: selector(
                ".sds-comps-profile-info-title-text span.sds-comps-text-type-body1",
            )?,
            item_badge: selector("span.sds-comps-text-type-badge")?,
            user_info: selector("div.userInfo")?,
            info_item: selector("span.infoItem")?,
            any_span: selector("span")?,
            date: Regex::new(r"\d{4}\.\d{2}\.\d{2}")
                .map_err(|e| ProcessError::Selector(e.to_string()))?,
        })
    }

    fn block_rank(&self, doc: &Html) -> i64 {
        doc.select(&self.section_root)
            .position(|root| root.value().attr("data-meta-ssuid") == Some(BLOCK_ID))
            .map(|idx| idx as i64 + 1)
            .unwrap_or(0)
    }

    fn item(&self, element: ElementRef<'_>) -> BlockItem {
        BlockItem {
            url: element
                .select(&self.item_url)
                .next()
                .and_then(|button| button.value().attr("data-url"))
                .unwrap_or_default()
                .to_string(),
            author: element
                .select(&self.item_author)
                .next()
                .map(stripped_text)
                .unwrap_or_default(),
            badge: element
                .select(&self.item_badge)
                .next()
                .map(stripped_text)
                .unwrap_or_default(),
        }
    }

    fn view_count_in(&self, text: &str) -> Option<String> {
        text.contains(VIEW_MARKER)
            .then(|| text.replace(VIEW_MARKER, "").trim().to_string())
    }

    fn date_in(&self, text: &str) -> Option<String> {
        if !text.contains(DATE_MARKER) {
            return None;
        }
        self.date.find(text).map(|m| m.as_str().to_string())
    }
}

impl PageExtractor for KinExtractor {
    fn extract_results(&self, html: &str) -> ResultPage {
        let doc = Html::parse_document(html);

        let blocks: Vec<ElementRef<'_>> = doc.select(&self.block).collect();
        if blocks.is_empty() {
            return ResultPage::default();
        }

        let items = blocks
            .iter()
            .flat_map(|block| block.select(&self.item))
            .map(|element| self.item(element))
            .collect();

        ResultPage {
            block_present: true,
            block_rank: self.block_rank(&doc),
            items,
        }
    }

    fn extract_detail(&self, html: &str) -> DetailInfo {
        let doc = Html::parse_document(html);
        let mut info = DetailInfo::default();

        if let Some(user_info) = doc.select(&self.user_info).next() {
            for span in user_info.select(&self.info_item) {
                let text = stripped_text(span);
                if let Some(views) = self.view_count_in(&text) {
                    info.view_count = views;
                } else if let Some(date) = self.date_in(&text) {
                    info.posted_date = date;
                }
            }
        }

        if info.view_count.is_empty() {
            if let Some(views) = doc
                .select(&self.any_span)
                .find_map(|span| self.view_count_in(&stripped_text(span)))
            {
                info.view_count = views;
            }
        }

        if info.posted_date.is_empty() {
            if let Some(date) = doc
                .select(&self.any_span)
                .find_map(|span| self.date_in(&stripped_text(span)))
            {
                info.posted_date = date;
            }
        }

        info
    }
}

/// Element text with each text node trimmed, concatenated.
fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// Every `href` on a page, for diagnostics.
pub fn collect_hrefs(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(String::from)
        .collect()
}
