//! Paging and sorting for list endpoints.
//!
//! # Query parameters
//! ```text
//! page=N        1..=10_000_000, default 1
//! page_size=N   1..=100, default 20
//! sort=COLUMN   one of the endpoint's safelist; a leading '-' sorts descending
//! ```

use std::cmp::Ordering;

use serde::Serialize;

use crate::domain::Validator;

pub const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE: usize = 10_000_000;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// Apply the direction to an ascending comparison.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: usize,
    pub page_size: usize,
    /// Column name without the direction prefix.
    pub sort: &'static str,
    pub direction: Direction,
}

impl Filters {
    /// Read paging and sorting from raw query values.
    ///
    /// Problems are recorded in `v`; the returned filters fall back to the
    /// defaults for any rejected value so the caller can keep collecting errors.
    pub fn parse(
        v: &mut Validator,
        page: Option<&str>,
        page_size: Option<&str>,
        sort: Option<&str>,
        safelist: &[&'static str],
    ) -> Self {
        let page = read_int(v, "page", page, 1);
        v.check(page >= 1, "page", "must be greater than zero");
        v.check(page <= MAX_PAGE as i64, "page", "must be a maximum of 10 million");

        let page_size = read_int(v, "page_size", page_size, DEFAULT_PAGE_SIZE as i64);
        v.check(page_size >= 1, "page_size", "must be greater than zero");
        v.check(page_size <= MAX_PAGE_SIZE as i64, "page_size", "must be a maximum of 100");

        let default_sort = safelist.first().copied().unwrap_or("id");
        let raw_sort = sort.unwrap_or(default_sort);
        let (column, direction) = match raw_sort.strip_prefix('-') {
            Some(column) => (column, Direction::Descending),
            None => (raw_sort, Direction::Ascending),
        };
        let known = safelist.iter().copied().find(|c| *c == column);
        v.check(
            known.is_some(),
            "sort",
            &format!("must be one of: {}", sort_choices(safelist)),
        );

        Self {
            page: clamp(page, 1, MAX_PAGE),
            page_size: clamp(page_size, 1, MAX_PAGE_SIZE),
            sort: known.unwrap_or(default_sort),
            direction: if known.is_some() { direction } else { Direction::Ascending },
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }

    /// Cut the page out of an already filtered and sorted row set.
    pub fn paginate<T>(&self, rows: Vec<T>) -> (Vec<T>, Metadata) {
        let metadata = Metadata::calculate(rows.len(), self.page, self.page_size);
        let page = rows.into_iter().skip(self.offset()).take(self.limit()).collect();
        (page, metadata)
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "id",
            direction: Direction::Ascending,
        }
    }
}

/// Paging summary returned next to a list. Empty when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<usize>,
}

impl Metadata {
    pub fn calculate(total_records: usize, page: usize, page_size: usize) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: Some(page),
            page_size: Some(page_size),
            first_page: Some(1),
            last_page: Some(total_records.div_ceil(page_size)),
            total_records: Some(total_records),
        }
    }
}

fn read_int(v: &mut Validator, field: &'static str, raw: Option<&str>, default: i64) -> i64 {
    match raw {
        None => default,
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                v.check(false, field, "must be an integer value");
                default
            }
        },
    }
}

fn clamp(value: i64, min: usize, max: usize) -> usize {
    usize::try_from(value).map_or(min, |n| n.clamp(min, max))
}

fn sort_choices(safelist: &[&str]) -> String {
    let ascending = safelist.iter().map(|c| c.to_string());
    let descending = safelist.iter().map(|c| format!("-{c}"));
    ascending.chain(descending).collect::<Vec<_>>().join(", ")
}
