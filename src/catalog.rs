//! Catalog file parsing for bulk keyword and URL uploads.
//!
//! Accepted formats: JSON or YAML arrays of objects, or delimited text
//! (tab or comma) whose first row is a header. Delimited columns are
//! positional:
//!
//! - keywords: product name, keyword, priority
//! - URLs: url, product name, conversion keyword, content type, keyword
//!
//! Rows that are entirely blank are skipped and exact duplicates collapse to
//! their first occurrence.

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{KeywordEntry, RegisteredUrlEntry};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Delimited(u8),
}

fn detect_format(path: &Path, contents: &str) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Format::Json,
        Some("yaml") | Some("yml") => Format::Yaml,
        Some("csv") => Format::Delimited(b','),
        Some("tsv") => Format::Delimited(b'\t'),
        _ => {
            let header = contents.lines().next().unwrap_or_default();
            if header.contains('\t') {
                Format::Delimited(b'\t')
            } else {
                Format::Delimited(b',')
            }
        }
    }
}

/// Read and parse a keyword catalog file.
pub async fn read_keywords(path: &Path) -> Result<Vec<KeywordEntry>, CatalogError> {
    let contents = read(path).await?;
    parse_keywords(path, &contents)
}

/// Read and parse a URL catalog file.
pub async fn read_urls(path: &Path) -> Result<Vec<RegisteredUrlEntry>, CatalogError> {
    let contents = read(path).await?;
    parse_urls(path, &contents)
}

async fn read(path: &Path) -> Result<String, CatalogError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CatalogError::Io(path.display().to_string(), e))
}

pub fn parse_keywords(path: &Path, contents: &str) -> Result<Vec<KeywordEntry>, CatalogError> {
    let entries = match detect_format(path, contents) {
        Format::Delimited(sep) => delimited_rows(contents, sep)?
            .iter()
            .map(|cols| KeywordEntry {
                product_name: column(cols, 0),
                keyword: column(cols, 1),
                priority: column(cols, 2),
            })
            .collect(),
        format => structured(format, contents)?,
    };
    Ok(dedupe_keywords(entries))
}

pub fn parse_urls(path: &Path, contents: &str) -> Result<Vec<RegisteredUrlEntry>, CatalogError> {
    let entries = match detect_format(path, contents) {
        Format::Delimited(sep) => delimited_rows(contents, sep)?
            .iter()
            .map(|cols| RegisteredUrlEntry {
                url: column(cols, 0),
                product_name: column(cols, 1),
                conversion_keyword: column(cols, 2),
                content_type: column(cols, 3),
                keyword: column(cols, 4),
            })
            .collect(),
        format => structured(format, contents)?,
    };
    Ok(dedupe_urls(entries))
}

fn structured<T: DeserializeOwned>(format: Format, contents: &str) -> Result<Vec<T>, CatalogError> {
    match format {
        Format::Yaml => serde_yaml::from_str(contents).map_err(|e| CatalogError::Parse(e.to_string())),
        _ => serde_json::from_str(contents).map_err(|e| CatalogError::Parse(e.to_string())),
    }
}

/// Data rows (header skipped) split on `sep`; short rows are allowed.
fn delimited_rows(contents: &str, sep: u8) -> Result<Vec<csv::StringRecord>, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sep)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CatalogError::Parse(e.to_string()))
}

fn column(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or_default().to_string()
}

/// Drop blank rows and repeated `(product, keyword, priority)` triples.
pub fn dedupe_keywords(entries: Vec<KeywordEntry>) -> Vec<KeywordEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !(e.product_name.is_empty() && e.keyword.is_empty() && e.priority.is_empty()))
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Drop blank rows and exact duplicates.
pub fn dedupe_urls(entries: Vec<RegisteredUrlEntry>) -> Vec<RegisteredUrlEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| {
            !(e.url.is_empty()
                && e.product_name.is_empty()
                && e.conversion_keyword.is_empty()
                && e.content_type.is_empty()
                && e.keyword.is_empty())
        })
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_from_tsv() {
        let contents = "상품명\t키워드\t우선순위\n\
                        오메가3\t오메가3 추천\tA\n\
                        \t\t\n\
                        오메가3\t오메가3 추천\tA\n\
                        루테인\t루테인 효능\n";
        let entries = parse_keywords(Path::new("keywords.tsv"), contents).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keyword, "오메가3 추천");
        assert_eq!(entries[0].priority, "A");
        assert_eq!(entries[1].product_name, "루테인");
        assert_eq!(entries[1].priority, "");
    }

    #[test]
    fn test_urls_from_csv_sniffed() {
        let contents = "url,product,conversion,type,keyword\r\n\
                        https://kin.naver.com/qna/detail.naver?d1id=1&docId=42,오메가3,전환,지식인,오메가3 추천\r\n";
        let entries = parse_urls(Path::new("urls.txt"), contents).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content_type, "지식인");
        assert_eq!(entries[0].keyword, "오메가3 추천");
    }

    #[test]
    fn test_keywords_from_json_and_yaml() {
        let json = r#"[{"product_name": "p", "keyword": "k"}, {"keyword": "k2", "priority": "B"}]"#;
        let entries = parse_keywords(Path::new("k.json"), json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].priority, "B");

        let yaml = "- product_name: p\n  keyword: k\n  priority: A\n";
        let entries = parse_keywords(Path::new("k.yaml"), yaml).unwrap();
        assert_eq!(entries[0].priority, "A");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            parse_urls(Path::new("u.json"), "[{"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_quoted_delimiter_stays_in_its_column() {
        let contents = "product,keyword,priority\n\"Omega, Gold\",omega 3,A\n";
        let entries = parse_keywords(Path::new("k.csv"), contents).unwrap();
        assert_eq!(
            entries,
            vec![KeywordEntry {
                product_name: "Omega, Gold".to_string(),
                keyword: "omega 3".to_string(),
                priority: "A".to_string(),
            }]
        );

        let contents = "url\tproduct\tconversion\ttype\tkeyword\n\
                        https://cafe.naver.com/club/12\t\"a\tb\"\t전환\t카페\t\"kw, one\"\n";
        let entries = parse_urls(Path::new("u.tsv"), contents).unwrap();
        assert_eq!(entries[0].product_name, "a\tb");
        assert_eq!(entries[0].keyword, "kw, one");
        assert_eq!(entries[0].content_type, "카페");
    }
}
