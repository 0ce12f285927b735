//! Operator diagnostics: identity health, raw hrefs, match traces,
//! and direct keyword runs. None of them persist anything or touch the
//! identity blacklist.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::crawler::autocomplete::{autocomplete_url, normalize_keyword};
use crate::crawler::extract::{collect_hrefs, search_url};
use crate::crawler::{KeywordProcessor, MatchTrace, ProcessError};
use crate::http_client::random_user_agent;
use crate::models::{CrawlJob, Keyword, KeywordOutcome, ReportRow, COLUMNS};
use crate::report::{build_report, ReportError, ReportSender, ReportTemplate};
use crate::repository::UrlCatalogRepository;

/// Page fetched when probing identities.
pub const PROBE_URL: &str = "https://m.search.naver.com/search.naver?query=test";
/// How many identities a probe tests.
pub const PROBE_LIMIT: usize = 5;
/// Product name given to ad-hoc keywords.
pub const TEST_PRODUCT: &str = "테스트";
/// Attachment name of a test report.
pub const TEST_FILENAME: &str = "테스트_통검결과.xlsx";
/// Subject line of a test report.
pub const TEST_SUBJECT: &str = "[지식인통검] 테스트 결과 파일 송부";

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub ip: String,
    /// HTTP status, or the transport error text.
    pub status: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityProbe {
    pub total_ips: usize,
    pub tested: usize,
    pub ok: usize,
    pub failed: usize,
    pub results: Vec<ProbeResult>,
}

/// Issue one request through each of the first few identities.
pub async fn probe_identities(processor: &KeywordProcessor) -> IdentityProbe {
    let fetcher = processor.fetcher();
    let all = fetcher.pool().all();

    let mut results = Vec::new();
    for ip in all.iter().take(PROBE_LIMIT) {
        let result = match fetcher.upstream().get(PROBE_URL, ip, &random_user_agent()).await {
            Ok(response) => ProbeResult {
                ip: ip.clone(),
                status: response.status.to_string(),
                ok: response.status == 200,
            },
            Err(e) => ProbeResult {
                ip: ip.clone(),
                status: e.to_string(),
                ok: false,
            },
        };
        results.push(result);
    }

    let ok = results.iter().filter(|r| r.ok).count();
    IdentityProbe {
        total_ips: all.len(),
        tested: results.len(),
        ok,
        failed: results.len() - ok,
        results,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HrefDump {
    pub keyword: String,
    pub url: String,
    pub identity: String,
    pub hrefs: Vec<String>,
}

/// Every href on the result page for `keyword` (searched verbatim), from a
/// single request.
pub async fn dump_hrefs(
    processor: &KeywordProcessor,
    keyword: &str,
) -> Result<HrefDump, ProcessError> {
    let url = search_url(keyword);
    let page = processor.fetcher().fetch_once(&url).await?;
    Ok(HrefDump {
        keyword: keyword.to_string(),
        url,
        identity: page.identity,
        hrefs: collect_hrefs(&page.body),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredTrace {
    pub url: String,
    pub normalized: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub keyword: String,
    pub search_term: String,
    pub block_present: bool,
    pub block_rank: i64,
    pub registered: Vec<RegisteredTrace>,
    pub items: Vec<MatchTrace>,
    pub matched: usize,
    pub analysis: String,
}

/// Compare the live result page for `keyword` against its registered URLs.
pub async fn trace_match(
    processor: &KeywordProcessor,
    urls: &UrlCatalogRepository,
    keyword: &str,
) -> Result<MatchReport, ProcessError> {
    let registered = urls.list_for_keyword(keyword).await?;

    let fetcher = processor.fetcher();
    let suggestions = fetcher.fetch_once(&autocomplete_url(keyword)).await?;
    let search_term = normalize_keyword(&suggestions.body, keyword)?;
    let page = fetcher.fetch_once(&search_url(&search_term)).await?;
    let results = processor.extractor().extract_results(&page.body);

    let matcher = processor.matcher();
    let items = matcher.trace(&results.items, &registered);
    let matched = items.iter().filter(|t| t.matched_url.is_some()).count();

    let analysis = if registered.is_empty() {
        "No URLs are registered for this keyword.".to_string()
    } else if items.is_empty() {
        "No block items were extracted; check the page structure.".to_string()
    } else if matched == 0 {
        "None of the registered URLs appear in the block.".to_string()
    } else {
        format!("{} item(s) matched a registered URL.", matched)
    };

    Ok(MatchReport {
        keyword: keyword.to_string(),
        search_term,
        block_present: results.block_present,
        block_rank: results.block_rank,
        registered: registered
            .iter()
            .map(|r| RegisteredTrace {
                url: r.url.clone(),
                normalized: matcher.normalize(&r.url),
            })
            .collect(),
        items,
        matched,
        analysis,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlTestRow {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlTest {
    pub count: usize,
    pub columns: Vec<&'static str>,
    pub results: Vec<CrawlTestRow>,
}

/// Split a comma separated keyword list, dropping blanks.
pub fn split_keywords(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Run the keyword pipeline directly for ad-hoc keywords.
pub async fn crawl_test(
    processor: &KeywordProcessor,
    urls: &UrlCatalogRepository,
    keywords: &[String],
) -> CrawlTest {
    let mut results = Vec::with_capacity(keywords.len());
    for text in keywords {
        results.push(match run_keyword(processor, urls, text).await {
            Ok(row) => CrawlTestRow {
                keyword: text.clone(),
                row: Some(labelled(&row)),
                error: None,
            },
            Err(e) => CrawlTestRow {
                keyword: text.clone(),
                row: None,
                error: Some(e.to_string()),
            },
        });
    }

    CrawlTest {
        count: results.len(),
        columns: COLUMNS.to_vec(),
        results,
    }
}

async fn run_keyword(
    processor: &KeywordProcessor,
    urls: &UrlCatalogRepository,
    text: &str,
) -> Result<ReportRow, ProcessError> {
    let keyword = Keyword {
        id: 0,
        product_name: TEST_PRODUCT.to_string(),
        keyword: text.to_string(),
        priority: String::new(),
        created_at: Utc::now(),
    };
    let registered = urls.list_for_keyword(text).await?;
    processor.process(&keyword, &registered).await
}

#[derive(Debug, Clone, Serialize)]
pub struct RunTest {
    pub keyword_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub filename: String,
    pub recipients: Vec<String>,
    pub elapsed: String,
}

/// The configured addressing with the test report's file name and subject.
pub fn test_template(base: &ReportTemplate) -> ReportTemplate {
    ReportTemplate {
        filename: TEST_FILENAME.to_string(),
        subject: TEST_SUBJECT.to_string(),
        ..base.clone()
    }
}

/// Crawl ad-hoc keywords and mail the workbook, without a job or any
/// persisted rows. Keywords that fail become empty rows.
pub async fn run_test(
    processor: &KeywordProcessor,
    urls: &UrlCatalogRepository,
    keywords: &[String],
    template: &ReportTemplate,
    sender: &dyn ReportSender,
    job_date: NaiveDate,
) -> Result<RunTest, ReportError> {
    let started_at = Utc::now();

    let mut outcomes = Vec::with_capacity(keywords.len());
    for (index, text) in keywords.iter().enumerate() {
        let id = i32::try_from(index).unwrap_or(i32::MAX);
        outcomes.push(match run_keyword(processor, urls, text).await {
            Ok(row) => KeywordOutcome::success(id, row),
            Err(e) => {
                warn!("Test keyword '{}' failed: {}", text, e);
                KeywordOutcome::failed(id)
            }
        });
    }

    let job = CrawlJob {
        id: 0,
        job_date,
        total_keywords: i32::try_from(keywords.len()).unwrap_or(i32::MAX),
        total_servers: 1,
        report_sent: false,
        started_at,
        completed_at: None,
    };
    let report = build_report(template, &job, &outcomes, Utc::now())?;
    sender.send(&report).await?;
    info!(
        "Test report sent: {} ok, {} failed, {}",
        report.succeeded, report.failed, report.elapsed
    );

    Ok(RunTest {
        keyword_count: keywords.len(),
        succeeded: report.succeeded,
        failed: report.failed,
        filename: report.filename,
        recipients: report.recipients,
        elapsed: report.elapsed,
    })
}

/// A row keyed by column header.
fn labelled(row: &ReportRow) -> serde_json::Map<String, serde_json::Value> {
    COLUMNS
        .iter()
        .zip(row.cells())
        .map(|(header, cell)| {
            let value = match cell {
                crate::models::Cell::Text(s) => serde_json::Value::String(s),
                crate::models::Cell::Number(n) => serde_json::Value::from(n),
            };
            (header.to_string(), value)
        })
        .collect()
}
