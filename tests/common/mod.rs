//! Shared fixtures: a scripted upstream, fixed volumes, a counting report
//! sender, and fleets of servers sharing one SQLite file.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use serpwatch::app::App;
use serpwatch::config::Settings;
use serpwatch::coordination::{CoordinationStore, InMemoryStore};
use serpwatch::crawler::{SearchVolume, VolumeError, VolumeLookup};
use serpwatch::dispatch::TaskPolicy;
use serpwatch::http_client::{FetchError, RetryPolicy, Upstream, UpstreamResponse};
use serpwatch::models::{KeywordEntry, RegisteredUrlEntry};
use serpwatch::report::{Report, ReportError, ReportSender, ReportTemplate};
use serpwatch::repository::DbContext;

/// Any URL containing this marker answers with a 500.
pub const BROKEN: &str = "broken";

pub const RESULTS: &str = r#"
    <html><body>
      <div data-fender-root="true" data-meta-ssuid="kin">
        <div data-template-id="kinItem">
          <button class="_keep_trigger" data-url="https://kin.naver.com/qna/detail.naver?d1id=7&amp;docId=222"></button>
          <div class="sds-comps-profile-info-title-text"><span class="sds-comps-text-type-body1">nutri_pro</span></div>
        </div>
      </div>
    </body></html>
"#;

pub const DETAIL: &str = r#"
    <div class="userInfo">
      <span class="infoItem">작성일 2024.02.03</span>
      <span class="infoItem">조회수 87</span>
    </div>
"#;

/// A stand-in for the search site.
#[derive(Default)]
pub struct Site {
    pub requests: AtomicUsize,
}

#[async_trait]
impl Upstream for Site {
    async fn get(
        &self,
        url: &str,
        _identity: &str,
        _user_agent: &str,
    ) -> Result<UpstreamResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let (status, body) = if url.contains(BROKEN) {
            (500, "")
        } else if url.contains("mac.search.naver.com") {
            (200, r#"_jsonp_0({"items":[[]]})"#)
        } else if url.contains("m.search.naver.com") {
            (200, RESULTS)
        } else {
            (200, DETAIL)
        };
        Ok(UpstreamResponse {
            status,
            body: body.to_string(),
        })
    }
}

pub struct FixedVolume;

#[async_trait]
impl VolumeLookup for FixedVolume {
    async fn monthly_volume(&self, _keyword: &str) -> Result<SearchVolume, VolumeError> {
        Ok(SearchVolume {
            pc: 10,
            mobile: 40,
        })
    }
}

/// Records every report it is handed; fails while `fail` is set.
#[derive(Default)]
pub struct CountingSender {
    pub fail: AtomicBool,
    pub attempts: AtomicUsize,
    pub delivered: Mutex<Vec<(usize, usize)>>,
}

impl CountingSender {
    pub fn delivered(&self) -> Vec<(usize, usize)> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportSender for CountingSender {
    async fn send(&self, report: &Report) -> Result<(), ReportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReportError::Delivery("relay unavailable".into()));
        }
        self.delivered
            .lock()
            .expect("sender lock")
            .push((report.succeeded, report.failed));
        Ok(())
    }
}

/// Several servers sharing one database, one coordination store, and one
/// report sender.
pub struct Fleet {
    _dir: TempDir,
    pub db: DbContext,
    pub store: Arc<dyn CoordinationStore>,
    pub site: Arc<Site>,
    pub sender: Arc<CountingSender>,
}

impl Fleet {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db = DbContext::new(&dir.path().join("serpwatch.db"));
        db.init_schema().await.expect("schema");
        Self {
            _dir: dir,
            db,
            store: Arc::new(InMemoryStore::new()),
            site: Arc::new(Site::default()),
            sender: Arc::new(CountingSender::default()),
        }
    }

    pub fn settings(&self, server_id: usize, total_servers: usize) -> Settings {
        Settings {
            server_id,
            total_servers,
            identities: vec!["10.0.0.1".into(), "10.0.0.2".into(), "10.0.0.3".into()],
            workers: 8,
            retry: RetryPolicy::immediate(2),
            task: TaskPolicy::immediate(1),
            report: ReportTemplate {
                recipients: vec!["ops@example.com".to_string()],
                ..ReportTemplate::default()
            },
            ..Settings::default()
        }
    }

    pub fn server(&self, server_id: usize, total_servers: usize) -> App {
        App::assemble(
            self.settings(server_id, total_servers),
            self.db.clone(),
            self.store.clone(),
            self.site.clone(),
            Arc::new(FixedVolume),
            self.sender.clone(),
        )
        .expect("assemble")
    }

    /// Load `count` keywords; those whose index is in `broken` can never be fetched.
    pub async fn seed(&self, count: usize, broken: &[usize]) {
        let keywords: Vec<KeywordEntry> = (0..count)
            .map(|i| KeywordEntry {
                product_name: "오메가3".to_string(),
                keyword: if broken.contains(&i) {
                    format!("{}-{}", BROKEN, i)
                } else {
                    format!("kw-{}", i)
                },
                priority: "B".to_string(),
            })
            .collect();
        self.db
            .keywords()
            .replace_all(&keywords)
            .await
            .expect("seed keywords");

        let urls = vec![RegisteredUrlEntry {
            url: "https://m.kin.naver.com/mobile/qna/detail.naver?docId=222".to_string(),
            product_name: "오메가3 골드".to_string(),
            conversion_keyword: "오메가3 추천".to_string(),
            content_type: "지식인".to_string(),
            keyword: "kw-0".to_string(),
        }];
        self.db.urls().replace_all(&urls).await.expect("seed urls");
    }
}
