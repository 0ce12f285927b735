//! The fixed-width report row produced for each keyword.

use serde::{Deserialize, Serialize};

/// Number of columns in the published report.
pub const COLUMN_COUNT: usize = 21;

/// Report column headers, in output order.
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "수집월",
    "수집일",
    "키워드제품명",
    "매칭키워드",
    "검색어",
    "우선순위",
    "검색량(P)",
    "검색량(M)",
    "모통지식인블럭유무",
    "모통노출유무",
    "모통노출위치",
    "ID",
    "송출유무",
    "질문일자",
    "종류",
    "URL제품",
    "전환키워드",
    "원고형태",
    "발행키워드",
    "송출URL",
    "누적조회수",
];

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Number(i64),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n)
    }
}

/// One keyword's output row.
///
/// Every numeric field is a plain `i64` so the row serializes to JSON without
/// loss when it is handed between tasks and persisted as a result payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    /// `YYYY-MM`
    pub collect_month: String,
    /// `YYYY.MM.DD`
    pub collect_date: String,
    pub product_name: String,
    pub keyword: String,
    /// Search term after autocomplete normalization.
    pub search_term: String,
    pub priority: String,
    pub pc_volume: i64,
    pub mobile_volume: i64,
    pub block_present: i64,
    pub exposed: i64,
    /// Position of the block among top-level result sections, 0 when absent.
    pub block_rank: i64,
    pub author: String,
    pub sent: i64,
    pub posted_date: String,
    pub badge: String,
    pub url_product: String,
    pub conversion_keyword: String,
    pub content_type: String,
    pub publish_keyword: String,
    pub sent_url: String,
    pub view_count: String,
}

impl ReportRow {
    /// Render the row in column order.
    pub fn cells(&self) -> Vec<Cell> {
        vec![
            self.collect_month.as_str().into(),
            self.collect_date.as_str().into(),
            self.product_name.as_str().into(),
            self.keyword.as_str().into(),
            self.search_term.as_str().into(),
            self.priority.as_str().into(),
            self.pc_volume.into(),
            self.mobile_volume.into(),
            self.block_present.into(),
            self.exposed.into(),
            self.block_rank.into(),
            self.author.as_str().into(),
            self.sent.into(),
            self.posted_date.as_str().into(),
            self.badge.as_str().into(),
            self.url_product.as_str().into(),
            self.conversion_keyword.as_str().into(),
            self.content_type.as_str().into(),
            self.publish_keyword.as_str().into(),
            self.sent_url.as_str().into(),
            self.view_count.as_str().into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_match_column_count() {
        let row = ReportRow::default();
        assert_eq!(row.cells().len(), COLUMNS.len());
    }

    #[test]
    fn test_numeric_columns_render_as_numbers() {
        let row = ReportRow {
            pc_volume: 120,
            mobile_volume: 900,
            block_rank: 3,
            ..Default::default()
        };
        let cells = row.cells();
        assert_eq!(cells[6], Cell::Number(120));
        assert_eq!(cells[7], Cell::Number(900));
        assert_eq!(cells[10], Cell::Number(3));
        assert_eq!(cells[0], Cell::Text(String::new()));
    }
}
