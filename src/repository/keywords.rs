//! Keyword catalog repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::{KeywordRecord, NewKeyword};
use super::pool::{DbPool, DieselError};
use super::util::parse_datetime;
use crate::models::{Keyword, KeywordEntry};
use crate::schema::keywords;
use crate::with_conn;

impl From<KeywordRecord> for Keyword {
    fn from(record: KeywordRecord) -> Self {
        Keyword {
            id: record.id,
            product_name: record.product_name,
            keyword: record.keyword,
            priority: record.priority,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Keyword catalog backed by the `keywords` table.
#[derive(Clone)]
pub struct KeywordRepository {
    pool: DbPool,
}

impl KeywordRepository {
    /// Create a new keyword repository.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replace the whole catalog with `entries`.
    ///
    /// Runs as one transaction so readers never observe an empty catalog.
    pub async fn replace_all(&self, entries: &[KeywordEntry]) -> Result<usize, DieselError> {
        let now = Utc::now().to_rfc3339();
        let entries = entries.to_vec();

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                let now = now.clone();
                let entries = entries.clone();
                Box::pin(async move {
                    diesel::delete(keywords::table).execute(conn).await?;

                    let rows: Vec<NewKeyword<'_>> = entries
                        .iter()
                        .map(|e| NewKeyword {
                            product_name: &e.product_name,
                            keyword: &e.keyword,
                            priority: &e.priority,
                            created_at: &now,
                        })
                        .collect();

                    let mut inserted = 0;
                    for row in &rows {
                        inserted += diesel::insert_into(keywords::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    Ok::<usize, DieselError>(inserted)
                })
            })
            .await
        })
    }

    /// Keyword ids in ascending order, optionally capped at `limit`.
    ///
    /// The ordering is what makes partitioning deterministic across servers.
    pub async fn list_ids(&self, limit: Option<i64>) -> Result<Vec<i32>, DieselError> {
        with_conn!(self.pool, conn => {
            let mut query = keywords::table
                .select(keywords::id)
                .order(keywords::id.asc())
                .into_boxed();
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            query.load::<i32>(&mut conn).await
        })
    }

    /// All keywords ordered by id.
    pub async fn list(&self) -> Result<Vec<Keyword>, DieselError> {
        with_conn!(self.pool, conn => {
            keywords::table
                .order(keywords::id.asc())
                .select(KeywordRecord::as_select())
                .load::<KeywordRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Keyword::from).collect())
        })
    }

    /// Get a keyword by id.
    pub async fn get(&self, id: i32) -> Result<Option<Keyword>, DieselError> {
        with_conn!(self.pool, conn => {
            keywords::table
                .find(id)
                .select(KeywordRecord::as_select())
                .first::<KeywordRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Keyword::from))
        })
    }

    /// Find the first keyword with the given text.
    pub async fn find_by_text(&self, text: &str) -> Result<Option<Keyword>, DieselError> {
        with_conn!(self.pool, conn => {
            keywords::table
                .filter(keywords::keyword.eq(text))
                .order(keywords::id.asc())
                .select(KeywordRecord::as_select())
                .first::<KeywordRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Keyword::from))
        })
    }

    /// Number of keywords in the catalog.
    pub async fn count(&self) -> Result<i64, DieselError> {
        with_conn!(self.pool, conn => {
            keywords::table.count().get_result::<i64>(&mut conn).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    fn entry(keyword: &str) -> KeywordEntry {
        KeywordEntry {
            product_name: "vitamin".to_string(),
            keyword: keyword.to_string(),
            priority: "A".to_string(),
        }
    }

    #[tokio::test]
    async fn test_replace_all_discards_previous_catalog() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let repo = ctx.keywords();

        repo.replace_all(&[entry("a"), entry("b"), entry("c")])
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 3);

        let inserted = repo.replace_all(&[entry("d")]).await.unwrap();
        assert_eq!(inserted, 1);

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].keyword, "d");
        assert_eq!(all[0].priority, "A");
    }

    #[tokio::test]
    async fn test_list_ids_is_ordered_and_limited() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let repo = ctx.keywords();

        let entries: Vec<_> = (0..10).map(|i| entry(&format!("kw{}", i))).collect();
        repo.replace_all(&entries).await.unwrap();

        let ids = repo.list_ids(None).await.unwrap();
        assert_eq!(ids.len(), 10);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let limited = repo.list_ids(Some(4)).await.unwrap();
        assert_eq!(limited, ids[..4].to_vec());

        let first = repo.get(ids[0]).await.unwrap().unwrap();
        assert_eq!(first.keyword, "kw0");
        assert!(repo.find_by_text("kw7").await.unwrap().is_some());
        assert!(repo.find_by_text("missing").await.unwrap().is_none());
    }
}
