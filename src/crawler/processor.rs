//! Per-keyword pipeline: autocomplete, volume, result page, match, detail.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};

use super::autocomplete::{autocomplete_url, normalize_keyword};
use super::extract::{search_url, PageExtractor};
use super::matching::UrlMatcher;
use super::volume::VolumeLookup;
use super::ProcessError;
use crate::http_client::Fetcher;
use crate::models::{Keyword, RegisteredUrl, ReportRow};

/// Turns one keyword into one report row.
///
/// Any fetch that exhausts its retries aborts the keyword; no partial row is
/// ever returned.
#[derive(Clone)]
pub struct KeywordProcessor {
    fetcher: Fetcher,
    volume: Arc<dyn VolumeLookup>,
    extractor: Arc<dyn PageExtractor>,
    matcher: Arc<UrlMatcher>,
    offset: FixedOffset,
}

impl KeywordProcessor {
    pub fn new(
        fetcher: Fetcher,
        volume: Arc<dyn VolumeLookup>,
        extractor: Arc<dyn PageExtractor>,
        matcher: Arc<UrlMatcher>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            fetcher,
            volume,
            extractor,
            matcher,
            offset,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn extractor(&self) -> &Arc<dyn PageExtractor> {
        &self.extractor
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    /// Run the full pipeline for `keyword` against its registered URLs.
    pub async fn process(
        &self,
        keyword: &Keyword,
        registered: &[RegisteredUrl],
    ) -> Result<ReportRow, ProcessError> {
        debug!("Processing keyword {} ({})", keyword.id, keyword.keyword);
        let collected_at: DateTime<FixedOffset> = Utc::now().with_timezone(&self.offset);
        let mut local_bad = HashSet::new();

        let search_term = self.normalize(&keyword.keyword, &mut local_bad).await?;

        let volume = self.volume.monthly_volume(&search_term).await?;

        let results_page = self
            .fetcher
            .fetch(&search_url(&search_term), &mut local_bad)
            .await?;
        let page = self.extractor.extract_results(&results_page.body);

        let mut row = ReportRow {
            collect_month: collected_at.format("%Y-%m").to_string(),
            collect_date: collected_at.format("%Y.%m.%d").to_string(),
            product_name: keyword.product_name.clone(),
            keyword: keyword.keyword.clone(),
            search_term: search_term.clone(),
            priority: keyword.priority.clone(),
            pc_volume: volume.pc,
            mobile_volume: volume.mobile,
            block_present: page.block_present as i64,
            block_rank: page.block_rank,
            ..Default::default()
        };

        let Some((item, matched)) = self.matcher.find_match(&page.items, registered) else {
            return Ok(row);
        };

        info!(
            "Keyword {} exposed at block rank {} via {}",
            keyword.keyword, page.block_rank, item.url
        );
        let detail_page = self.fetcher.fetch(&item.url, &mut local_bad).await?;
        let detail = self.extractor.extract_detail(&detail_page.body);

        row.exposed = 1;
        row.sent = 1;
        row.author = item.author.clone();
        row.badge = item.badge.clone();
        row.posted_date = detail.posted_date;
        row.url_product = matched.product_name.clone();
        row.conversion_keyword = matched.conversion_keyword.clone();
        row.content_type = matched.content_type.clone();
        row.publish_keyword = search_term;
        row.sent_url = matched.url.clone();
        row.view_count = detail.view_count;

        Ok(row)
    }

    /// Resolve the upstream's own spelling of a keyword.
    pub async fn normalize(
        &self,
        keyword: &str,
        local_bad: &mut HashSet<String>,
    ) -> Result<String, ProcessError> {
        let page = self
            .fetcher
            .fetch(&autocomplete_url(keyword), local_bad)
            .await?;
        normalize_keyword(&page.body, keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryStore;
    use crate::crawler::{KinExtractor, SearchVolume, VolumeError};
    use crate::http_client::{FetchError, RetryPolicy, Upstream, UpstreamResponse};
    use crate::identity::IdentityPool;
    use async_trait::async_trait;

    const AUTOCOMPLETE: &str = r#"_jsonp_0({"items":[[["오메가 3"],["오메가3 효능"]]]})"#;
    const RESULTS: &str = r#"
        <html><body>
          <div data-fender-root="true" data-meta-ssuid="web"></div>
          <div data-fender-root="true" data-meta-ssuid="kin">
            <div data-template-id="kinItem">
              <button class="_keep_trigger" data-url="https://kin.naver.com/qna/detail.naver?d1id=7&amp;docId=111"></button>
              <div class="sds-comps-profile-info-title-text"><span class="sds-comps-text-type-body1">first_author</span></div>
            </div>
            <div data-template-id="kinItem">
              <button class="_keep_trigger" data-url="https://kin.naver.com/qna/detail.naver?d1id=7&amp;docId=222"></button>
              <div class="sds-comps-profile-info-title-text"><span class="sds-comps-text-type-body1">nutri_pro</span></div>
              <span class="sds-comps-text-type-badge">채택</span>
            </div>
          </div>
        </body></html>
    "#;
    const DETAIL: &str = r#"
        <div class="userInfo">
          <span class="infoItem">작성일 2024.02.03</span>
          <span class="infoItem">조회수 1,234</span>
        </div>
    "#;

    /// Serves every page with a 200, or every request with `status`.
    struct Site {
        status: u16,
    }

    #[async_trait]
    impl Upstream for Site {
        async fn get(
            &self,
            url: &str,
            _identity: &str,
            _user_agent: &str,
        ) -> Result<UpstreamResponse, FetchError> {
            let body = if url.contains("mac.search.naver.com") {
                AUTOCOMPLETE
            } else if url.contains("m.search.naver.com") {
                RESULTS
            } else {
                DETAIL
            };
            Ok(UpstreamResponse {
                status: self.status,
                body: body.to_string(),
            })
        }
    }

    struct FixedVolume;

    #[async_trait]
    impl VolumeLookup for FixedVolume {
        async fn monthly_volume(&self, _keyword: &str) -> Result<SearchVolume, VolumeError> {
            Ok(SearchVolume {
                pc: 120,
                mobile: 900,
            })
        }
    }

    fn processor(status: u16) -> KeywordProcessor {
        let pool = IdentityPool::new(
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            Arc::new(InMemoryStore::new()),
        );
        let fetcher = Fetcher::new(Arc::new(Site { status }), pool, RetryPolicy::immediate(3));
        KeywordProcessor::new(
            fetcher,
            Arc::new(FixedVolume),
            Arc::new(KinExtractor::new().unwrap()),
            Arc::new(UrlMatcher::new().unwrap()),
            FixedOffset::east_opt(9 * 3600).unwrap(),
        )
    }

    fn keyword() -> Keyword {
        Keyword {
            id: 7,
            product_name: "오메가3".to_string(),
            keyword: "오메가3".to_string(),
            priority: "A".to_string(),
            created_at: Utc::now(),
        }
    }

    fn registered(url: &str) -> RegisteredUrl {
        RegisteredUrl {
            id: 1,
            url: url.to_string(),
            product_name: "오메가3 골드".to_string(),
            conversion_keyword: "오메가3 추천".to_string(),
            content_type: "지식인".to_string(),
            keyword: "오메가3".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_no_match_row_has_signals_but_no_match_fields() {
        let catalog = vec![registered("https://kin.naver.com/qna/detail.naver?docId=999")];
        let row = processor(200).process(&keyword(), &catalog).await.unwrap();

        assert_eq!(row.search_term, "오메가 3");
        assert_eq!(row.keyword, "오메가3");
        assert_eq!(row.priority, "A");
        assert_eq!(row.pc_volume, 120);
        assert_eq!(row.mobile_volume, 900);
        assert_eq!(row.block_present, 1);
        assert_eq!(row.block_rank, 2);
        assert_eq!(row.exposed, 0);
        assert_eq!(row.sent, 0);
        assert!(row.author.is_empty());
        assert!(row.sent_url.is_empty());
        assert!(row.url_product.is_empty());
        assert!(row.view_count.is_empty());
        assert!(row.posted_date.is_empty());
        assert_eq!(row.collect_month.len(), "2024-01".len());
    }

    #[tokio::test]
    async fn test_match_fills_detail_fields() {
        let catalog = vec![registered(
            "https://m.kin.naver.com/mobile/qna/detail.naver?docId=222&from=share",
        )];
        let row = processor(200).process(&keyword(), &catalog).await.unwrap();

        assert_eq!(row.exposed, 1);
        assert_eq!(row.sent, 1);
        assert_eq!(row.author, "nutri_pro");
        assert_eq!(row.badge, "채택");
        assert_eq!(row.posted_date, "2024.02.03");
        assert_eq!(row.view_count, "1,234");
        assert_eq!(row.url_product, "오메가3 골드");
        assert_eq!(row.conversion_keyword, "오메가3 추천");
        assert_eq!(row.content_type, "지식인");
        assert_eq!(row.publish_keyword, "오메가 3");
        assert_eq!(row.sent_url, catalog[0].url);
    }

    #[tokio::test]
    async fn test_exhausted_fetch_aborts_keyword() {
        let err = processor(503).process(&keyword(), &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Fetch(FetchError::Exhausted { attempts: 3, .. })
        ));
    }
}
