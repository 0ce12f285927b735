//! Diesel ORM records for database tables.

use diesel::prelude::*;

use crate::schema;

/// Keyword record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::keywords)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KeywordRecord {
    pub id: i32,
    pub product_name: String,
    pub keyword: String,
    pub priority: String,
    pub created_at: String,
}

/// New keyword for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::keywords)]
pub struct NewKeyword<'a> {
    pub product_name: &'a str,
    pub keyword: &'a str,
    pub priority: &'a str,
    pub created_at: &'a str,
}

/// Registered URL record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::registered_urls)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RegisteredUrlRecord {
    pub id: i32,
    pub url: String,
    pub product_name: String,
    pub conversion_keyword: String,
    pub content_type: String,
    pub keyword: String,
    pub created_at: String,
}

/// New registered URL for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::registered_urls)]
pub struct NewRegisteredUrl<'a> {
    pub url: &'a str,
    pub product_name: &'a str,
    pub conversion_keyword: &'a str,
    pub content_type: &'a str,
    pub keyword: &'a str,
    pub created_at: &'a str,
}

/// Crawl job record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlJobRecord {
    pub id: i32,
    pub job_date: String,
    pub total_keywords: i32,
    pub total_servers: i32,
    pub report_sent: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// New crawl job for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::crawl_jobs)]
pub struct NewCrawlJob<'a> {
    pub job_date: &'a str,
    pub total_keywords: i32,
    pub total_servers: i32,
    pub report_sent: i32,
    pub started_at: &'a str,
}

/// Crawl result record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlResultRecord {
    pub id: i32,
    pub job_id: i32,
    pub keyword_id: i32,
    pub server_id: i32,
    pub status: String,
    pub payload: String,
    pub created_at: String,
}

/// New crawl result for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::crawl_results)]
pub struct NewCrawlResult<'a> {
    pub job_id: i32,
    pub keyword_id: i32,
    pub server_id: i32,
    pub status: &'a str,
    pub payload: &'a str,
    pub created_at: &'a str,
}
