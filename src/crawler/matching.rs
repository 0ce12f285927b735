//! Matching block items against the registered URL catalog.
//!
//! URLs are compared by platform content id, not by raw string: the same
//! post is linked with different query strings, hosts, and tracking params.

use regex::Regex;

use super::extract::BlockItem;
use super::ProcessError;
use crate::models::RegisteredUrl;

/// Reduces platform URLs to a comparable content id.
pub struct UrlMatcher {
    kin: Regex,
    cafe: Regex,
    blog: Regex,
    influencer: Regex,
}

impl UrlMatcher {
    pub fn new() -> Result<Self, ProcessError> {
        let compile = |re: &str| Regex::new(re).map_err(|e| ProcessError::Selector(e.to_string()));
        Ok(Self {
            kin: compile(r"docId=(\d+)")?,
            cafe: compile(r"cafe\.naver\.com/([^/?]+/\d+)")?,
            blog: compile(r"blog\.naver\.com/([^/?]+/\d+)")?,
            influencer: compile(r"in\.naver\.com/([^/?]+/contents/internal/\d+)")?,
        })
    }

    /// Content id for a URL, or `None` if it is not a recognizable post.
    pub fn normalize(&self, url: &str) -> Option<String> {
        let (platform, re) = if url.contains("kin.naver.com") || url.contains("docId=") {
            ("kin", &self.kin)
        } else if url.contains("cafe.naver.com") {
            ("cafe", &self.cafe)
        } else if url.contains("blog.naver.com") {
            ("blog", &self.blog)
        } else if url.contains("in.naver.com") {
            ("in", &self.influencer)
        } else {
            return None;
        };

        re.captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| format!("{}:{}", platform, m.as_str()))
    }

    /// First item (in page order) whose URL matches a registered URL.
    ///
    /// Items without a URL are skipped.
    pub fn find_match<'a, 'b>(
        &self,
        items: &'a [BlockItem],
        registered: &'b [RegisteredUrl],
    ) -> Option<(&'a BlockItem, &'b RegisteredUrl)> {
        let catalog: Vec<(String, &RegisteredUrl)> = registered
            .iter()
            .filter_map(|r| self.normalize(&r.url).map(|id| (id, r)))
            .collect();

        items
            .iter()
            .filter(|item| !item.url.is_empty())
            .find_map(|item| {
                let id = self.normalize(&item.url)?;
                catalog
                    .iter()
                    .find(|(registered_id, _)| *registered_id == id)
                    .map(|(_, r)| (item, *r))
            })
    }

    /// Explain how each item compares against the catalog, for diagnostics.
    pub fn trace(&self, items: &[BlockItem], registered: &[RegisteredUrl]) -> Vec<MatchTrace> {
        items
            .iter()
            .map(|item| {
                let normalized = self.normalize(&item.url);
                let matched_url = normalized.as_ref().and_then(|id| {
                    registered
                        .iter()
                        .find(|r| self.normalize(&r.url).as_ref() == Some(id))
                        .map(|r| r.url.clone())
                });
                MatchTrace {
                    item_url: item.url.clone(),
                    normalized,
                    matched_url,
                }
            })
            .collect()
    }
}

/// One line of a matching trace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchTrace {
    pub item_url: String,
    pub normalized: Option<String>,
    pub matched_url: Option<String>,
}
