//! Paginated listing collection.
//!
//! Certificate listings report a `total` on the first page; declaration
//! listings do not and are read until an empty page comes back. Both
//! strategies fetch strictly in page order and keep the registry's order
//! within a page.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::dates::format_filter;
use crate::error::{HarvesterError, Result};
use crate::types::{ListItem, Page};

/// How the collector knows it has seen the last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Page 0 carries `total`; fetch `ceil(total / page_size)` pages.
    CountDriven,
    /// Fetch until a page has no items.
    SentinelDriven,
}

/// Number of pages needed for `total` items.
///
/// # Examples
/// ```
/// use fsa_harvester::collector::total_pages;
///
/// assert_eq!(total_pages(0, 100), 0);
/// assert_eq!(total_pages(100, 100), 1);
/// assert_eq!(total_pages(101, 100), 2);
/// ```
#[must_use]
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size.max(1)))
}

/// Inclusive end-date range of the records to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// Listing request body, as the registry expects it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub size: u32,
    pub page: u64,
    pub filter: PageFilter,
    pub columns_sort: Vec<ColumnSort>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFilter {
    pub id_tech_reg: Vec<u64>,
    pub reg_date: DateRange,
    pub end_date: DateRange,
    pub columns_search: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub min_date: String,
    pub max_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSort {
    pub column: String,
    pub sort: String,
}

impl PageQuery {
    /// Query for page 0; the same filter is reused for every page.
    #[must_use]
    pub fn new(size: u32, window: DateWindow, tech_reg_ids: Vec<u64>, sort_column: &str) -> Self {
        Self {
            size,
            page: 0,
            filter: PageFilter {
                id_tech_reg: tech_reg_ids,
                reg_date: DateRange {
                    min_date: String::new(),
                    max_date: String::new(),
                },
                end_date: DateRange {
                    min_date: format_filter(window.min),
                    max_date: format_filter(window.max),
                },
                columns_search: Vec::new(),
            },
            columns_sort: vec![ColumnSort {
                column: sort_column.to_string(),
                sort: "ASC".to_string(),
            }],
        }
    }

    #[must_use]
    pub fn for_page(&self, page: u64) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// Drives page fetches until the listing is exhausted.
#[derive(Debug, Clone)]
pub struct Collector {
    pagination: Pagination,
    page_size: u32,
    page_delay: Duration,
}

impl Collector {
    pub fn new(pagination: Pagination, page_size: u32, page_delay: Duration) -> Self {
        Self {
            pagination,
            page_size,
            page_delay,
        }
    }

    /// Fetch every page through `fetch_page` and concatenate the items.
    ///
    /// `fetch_page` receives zero-based page numbers in increasing order.
    pub fn collect_all<F>(&self, mut fetch_page: F) -> Result<Vec<ListItem>>
    where
        F: FnMut(u64) -> Result<Page>,
    {
        match self.pagination {
            Pagination::CountDriven => self.collect_counted(&mut fetch_page),
            Pagination::SentinelDriven => self.collect_until_empty(&mut fetch_page),
        }
    }

    fn collect_counted<F>(&self, fetch_page: &mut F) -> Result<Vec<ListItem>>
    where
        F: FnMut(u64) -> Result<Page>,
    {
        let first = fetch_page(0)?;
        let total = first.total.ok_or_else(|| {
            HarvesterError::DataRetrieval("first listing page carries no total".into())
        })?;
        let pages = total_pages(total, self.page_size);
        tracing::info!(total, pages, "Listing size known");

        let mut items = first.items;
        for page in 1..pages {
            self.pause();
            let page_data = fetch_page(page)?;
            tracing::debug!(page, items = page_data.items.len(), "Fetched page");
            items.extend(page_data.items);
        }

        Ok(items)
    }

    fn collect_until_empty<F>(&self, fetch_page: &mut F) -> Result<Vec<ListItem>>
    where
        F: FnMut(u64) -> Result<Page>,
    {
        let mut items = Vec::new();
        let mut page = 0;

        loop {
            if page > 0 {
                self.pause();
            }
            let page_data = fetch_page(page)?;
            if page_data.items.is_empty() {
                break;
            }
            tracing::debug!(page, items = page_data.items.len(), "Fetched page");
            items.extend(page_data.items);
            page += 1;
        }

        tracing::info!(pages = page, items = items.len(), "Listing exhausted");
        Ok(items)
    }

    fn pause(&self) {
        if !self.page_delay.is_zero() {
            thread::sleep(self.page_delay);
        }
    }
}

/// Drop repeated ids, keeping the first occurrence.
///
/// The registry can return overlapping pages while it is being written to.
#[must_use]
pub fn dedup_by_id(items: Vec<ListItem>) -> Vec<ListItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn item(id: u64, number: &str) -> ListItem {
        ListItem {
            id,
            id_status: Some(6),
            number: number.to_string(),
            reg_date: "2023-01-01".to_string(),
            end_date: "2023-12-01".to_string(),
            object_type: "Серийный выпуск".to_string(),
            manufacturer_name: None,
        }
    }

    fn page(total: Option<u64>, ids: &[u64]) -> Page {
        Page {
            total,
            items: ids.iter().map(|id| item(*id, "N")).collect(),
        }
    }

    fn ids(items: &[ListItem]) -> Vec<u64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(99, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(1000, 1000), 1);
        assert_eq!(total_pages(2500, 1000), 3);
    }

    #[test]
    fn test_count_driven_fetches_exactly_total_pages() {
        let collector = Collector::new(Pagination::CountDriven, 2, Duration::ZERO);
        let mut requested = Vec::new();

        let items = collector
            .collect_all(|n| {
                requested.push(n);
                Ok(match n {
                    0 => page(Some(5), &[1, 2]),
                    1 => page(Some(5), &[3, 4]),
                    2 => page(Some(5), &[5]),
                    _ => page(Some(5), &[99]),
                })
            })
            .unwrap();

        assert_eq!(requested, vec![0, 1, 2]);
        assert_eq!(ids(&items), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_count_driven_exact_division() {
        let collector = Collector::new(Pagination::CountDriven, 2, Duration::ZERO);
        let mut requested = Vec::new();

        collector
            .collect_all(|n| {
                requested.push(n);
                Ok(page(Some(4), &[n * 2, n * 2 + 1]))
            })
            .unwrap();

        assert_eq!(requested, vec![0, 1]);
    }

    #[test]
    fn test_count_driven_empty_listing() {
        let collector = Collector::new(Pagination::CountDriven, 100, Duration::ZERO);
        let mut requested = Vec::new();

        let items = collector
            .collect_all(|n| {
                requested.push(n);
                Ok(page(Some(0), &[]))
            })
            .unwrap();

        assert_eq!(requested, vec![0]);
        assert!(items.is_empty());
    }

    #[test]
    fn test_count_driven_requires_total() {
        let collector = Collector::new(Pagination::CountDriven, 100, Duration::ZERO);
        let err = collector.collect_all(|_| Ok(page(None, &[1]))).unwrap_err();
        assert!(matches!(err, HarvesterError::DataRetrieval(_)));
    }

    #[test]
    fn test_sentinel_stops_at_first_empty_page() {
        let collector = Collector::new(Pagination::SentinelDriven, 2, Duration::ZERO);
        let mut requested = Vec::new();

        let items = collector
            .collect_all(|n| {
                requested.push(n);
                Ok(match n {
                    0 => page(None, &[1, 2]),
                    1 => page(None, &[3]),
                    2 => page(None, &[]),
                    _ => page(None, &[42]),
                })
            })
            .unwrap();

        assert_eq!(requested, vec![0, 1, 2]);
        assert_eq!(ids(&items), vec![1, 2, 3]);
    }

    #[test]
    fn test_page_error_propagates() {
        let collector = Collector::new(Pagination::SentinelDriven, 2, Duration::ZERO);
        let err = collector
            .collect_all(|n| {
                if n == 1 {
                    Err(HarvesterError::Credential { status: 401 })
                } else {
                    Ok(page(None, &[n]))
                }
            })
            .unwrap_err();
        assert!(matches!(err, HarvesterError::Credential { .. }));
    }

    #[test]
    fn test_dedup_keeps_first_and_is_idempotent() {
        let items = vec![
            item(1, "first"),
            item(2, "a"),
            item(1, "second"),
            item(3, "b"),
            item(2, "c"),
        ];

        let once = dedup_by_id(items);
        assert_eq!(ids(&once), vec![1, 2, 3]);
        assert_eq!(once[0].number, "first");
        assert_eq!(once[1].number, "a");

        let twice = dedup_by_id(once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_page_query_body() {
        let window = DateWindow {
            min: NaiveDate::from_ymd_opt(2023, 11, 11).unwrap(),
            max: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        };
        let query = PageQuery::new(100, window, vec![8, 39], "date").for_page(3);

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "size": 100,
                "page": 3,
                "filter": {
                    "idTechReg": [8, 39],
                    "regDate": {"minDate": "", "maxDate": ""},
                    "endDate": {"minDate": "2023-11-11", "maxDate": "2023-12-31"},
                    "columnsSearch": []
                },
                "columnsSort": [{"column": "date", "sort": "ASC"}]
            })
        );
    }
}
