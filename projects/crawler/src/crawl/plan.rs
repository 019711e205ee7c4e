use chrono::{Days, NaiveDate};

/// GitHub search silently truncates any one result set at this many
/// repositories; windows expecting more must be narrowed.
pub const SEARCH_RESULT_CEILING: i64 = 1000;

/// One independently checkpointed unit of crawl work: a fixed search
/// expression plus the key its checkpoint row lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    pub partition_key: String,
    pub search_query: String,
    window: Option<DateWindow>,
}

#[derive(Debug, Clone, PartialEq)]
struct DateWindow {
    base_query: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl PartitionPlan {
    /// An explicitly configured partition; the query doubles as the key.
    pub fn from_query(query: &str) -> Self {
        Self {
            partition_key: query.to_string(),
            search_query: query.to_string(),
            window: None,
        }
    }

    /// True for created-date windows wider than one day, the only plans
    /// that can still be split when they overrun the search ceiling.
    pub fn is_narrowable(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.start < w.end)
    }

    /// Splits a multi-day window into single-day partitions. Explicit
    /// query partitions and single-day windows have nothing to split.
    pub fn narrow_to_days(&self) -> Option<Vec<PartitionPlan>> {
        let window = self.window.as_ref().filter(|w| w.start < w.end)?;
        Some(window_partitions(
            &window.base_query,
            window.start,
            window.end,
            1,
        ))
    }
}

/// Splits `[start, end]` into created-date windows of `window_days` days
/// and composes each with the base search expression. GitHub search caps
/// any one result set at 1000 repositories, so narrow windows are how a
/// large corpus gets fully enumerated.
pub fn window_partitions(
    base_query: &str,
    start: NaiveDate,
    end: NaiveDate,
    window_days: u32,
) -> Vec<PartitionPlan> {
    let window_days = window_days.max(1);
    let mut partitions = Vec::new();
    let mut current = start;

    while current <= end {
        let window_end = current
            .checked_add_days(Days::new(u64::from(window_days) - 1))
            .unwrap_or(end)
            .min(end);
        let created_range = format!("created:{current}..{window_end}");

        partitions.push(PartitionPlan {
            partition_key: format!("{current}_{window_end}"),
            search_query: format!("{base_query} {created_range}"),
            window: Some(DateWindow {
                base_query: base_query.to_string(),
                start: current,
                end: window_end,
            }),
        });

        match window_end.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }

    partitions
}
