//! Registered URL catalog repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::{NewRegisteredUrl, RegisteredUrlRecord};
use super::pool::{DbPool, DieselError};
use super::util::parse_datetime;
use crate::models::{RegisteredUrl, RegisteredUrlEntry};
use crate::schema::registered_urls;
use crate::with_conn;

impl From<RegisteredUrlRecord> for RegisteredUrl {
    fn from(record: RegisteredUrlRecord) -> Self {
        RegisteredUrl {
            id: record.id,
            url: record.url,
            product_name: record.product_name,
            conversion_keyword: record.conversion_keyword,
            content_type: record.content_type,
            keyword: record.keyword,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// URL catalog backed by the `registered_urls` table.
#[derive(Clone)]
pub struct UrlCatalogRepository {
    pool: DbPool,
}

impl UrlCatalogRepository {
    /// Create a new URL catalog repository.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replace the whole catalog with `entries`.
    pub async fn replace_all(&self, entries: &[RegisteredUrlEntry]) -> Result<usize, DieselError> {
        let now = Utc::now().to_rfc3339();
        let entries = entries.to_vec();

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                let now = now.clone();
                let entries = entries.clone();
                Box::pin(async move {
                    diesel::delete(registered_urls::table).execute(conn).await?;

                    let mut inserted = 0;
                    for e in &entries {
                        inserted += diesel::insert_into(registered_urls::table)
                            .values(NewRegisteredUrl {
                                url: &e.url,
                                product_name: &e.product_name,
                                conversion_keyword: &e.conversion_keyword,
                                content_type: &e.content_type,
                                keyword: &e.keyword,
                                created_at: &now,
                            })
                            .execute(conn)
                            .await?;
                    }
                    Ok::<usize, DieselError>(inserted)
                })
            })
            .await
        })
    }

    /// URLs registered for a keyword, in insertion order.
    pub async fn list_for_keyword(&self, keyword: &str) -> Result<Vec<RegisteredUrl>, DieselError> {
        with_conn!(self.pool, conn => {
            registered_urls::table
                .filter(registered_urls::keyword.eq(keyword))
                .order(registered_urls::id.asc())
                .select(RegisteredUrlRecord::as_select())
                .load::<RegisteredUrlRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(RegisteredUrl::from).collect())
        })
    }

    /// Number of registered URLs.
    pub async fn count(&self) -> Result<i64, DieselError> {
        with_conn!(self.pool, conn => {
            registered_urls::table.count().get_result::<i64>(&mut conn).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    fn entry(keyword: &str, url: &str) -> RegisteredUrlEntry {
        RegisteredUrlEntry {
            url: url.to_string(),
            product_name: "omega".to_string(),
            conversion_keyword: "omega3".to_string(),
            content_type: "answer".to_string(),
            keyword: keyword.to_string(),
        }
    }

    #[tokio::test]
    async fn test_urls_grouped_by_keyword_text() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let repo = ctx.urls();

        repo.replace_all(&[
            entry("fish oil", "https://kin.naver.com/qna/detail.naver?d1id=7&docId=111"),
            entry("fish oil", "https://kin.naver.com/qna/detail.naver?d1id=7&docId=222"),
            entry("krill", "https://kin.naver.com/qna/detail.naver?d1id=7&docId=333"),
        ])
        .await
        .unwrap();

        let fish = repo.list_for_keyword("fish oil").await.unwrap();
        assert_eq!(fish.len(), 2);
        assert!(fish[0].url.ends_with("111"));
        assert_eq!(fish[0].conversion_keyword, "omega3");

        repo.replace_all(&[entry("krill", "https://kin.naver.com/x?docId=9")])
            .await
            .unwrap();
        assert!(repo.list_for_keyword("fish oil").await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
