//! Ranked follower report
//!
//! Consumes the stored follower set and renders the top accounts as a
//! psql-style text table.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::followers::core::{FollowerId, FollowerRecord, JoinedAt, RESOLVED_AT_FORMAT, UNKNOWN_MARKER};

/// Display format for join dates
pub const JOINED_DISPLAY_FORMAT: &str = "%a %b %d, %Y";

/// Default number of ranked rows
pub const DEFAULT_TOP_N: usize = 20;

/// A field that can be shown in, or rank, the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportColumn {
    ScreenName,
    FollowersCount,
    Joined,
    Name,
    Id,
    ResolvedAt,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 6] = [
        ReportColumn::ScreenName,
        ReportColumn::FollowersCount,
        ReportColumn::Joined,
        ReportColumn::Name,
        ReportColumn::Id,
        ReportColumn::ResolvedAt,
    ];

    /// Table header text
    pub fn label(&self) -> &'static str {
        match self {
            ReportColumn::ScreenName => "Screen Name",
            ReportColumn::FollowersCount => "Followers Count",
            ReportColumn::Joined => "Joined Twitter",
            ReportColumn::Name => "Name",
            ReportColumn::Id => "ID",
            ReportColumn::ResolvedAt => "Resolved At",
        }
    }

    /// Name accepted on the command line
    pub fn key(&self) -> &'static str {
        match self {
            ReportColumn::ScreenName => "screen_name",
            ReportColumn::FollowersCount => "followers_count",
            ReportColumn::Joined => "joined",
            ReportColumn::Name => "name",
            ReportColumn::Id => "id",
            ReportColumn::ResolvedAt => "resolved_at",
        }
    }

    fn right_aligned(&self) -> bool {
        matches!(self, ReportColumn::FollowersCount | ReportColumn::Id)
    }

    fn cell(&self, record: &FollowerRecord) -> String {
        match self {
            ReportColumn::ScreenName => record.screen_name.clone(),
            ReportColumn::FollowersCount => group_thousands(record.followers_count),
            ReportColumn::Joined => match record.joined_at {
                JoinedAt::At(at) => at.format(JOINED_DISPLAY_FORMAT).to_string(),
                JoinedAt::Unknown => UNKNOWN_MARKER.to_string(),
            },
            ReportColumn::Name => record.display_name.clone(),
            ReportColumn::Id => record.id.to_string(),
            ReportColumn::ResolvedAt => record.resolved_at.format(RESOLVED_AT_FORMAT).to_string(),
        }
    }

    /// Ascending order of two records on this column
    fn compare(&self, a: &FollowerRecord, b: &FollowerRecord) -> Ordering {
        match self {
            ReportColumn::ScreenName => a.screen_name.to_lowercase().cmp(&b.screen_name.to_lowercase()),
            ReportColumn::FollowersCount => a.followers_count.cmp(&b.followers_count),
            ReportColumn::Joined => a.joined_at.cmp(&b.joined_at),
            ReportColumn::Name => a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()),
            ReportColumn::Id => compare_ids(&a.id, &b.id),
            ReportColumn::ResolvedAt => a.resolved_at.cmp(&b.resolved_at),
        }
    }
}

impl fmt::Display for ReportColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReportColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('-', "_");
        match key.as_str() {
            "created_at" => return Ok(ReportColumn::Joined),
            "timestamp" => return Ok(ReportColumn::ResolvedAt),
            "display_name" => return Ok(ReportColumn::Name),
            _ => {}
        }
        ReportColumn::ALL
            .into_iter()
            .find(|column| column.key() == key)
            .ok_or_else(|| {
                let keys: Vec<&str> = ReportColumn::ALL.iter().map(|c| c.key()).collect();
                format!("unknown column '{}', expected one of: {}", s, keys.join(", "))
            })
    }
}

/// Numeric ids compare by value; text comparison is only a fallback
fn compare_ids(a: &FollowerId, b: &FollowerId) -> Ordering {
    let (a, b) = (a.as_str(), b.as_str());
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// Render `n` with comma thousands separators
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// What the report shows and how it ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub columns: Vec<ReportColumn>,
    /// Ranked descending, ties keep store order
    pub sort_by: ReportColumn,
    pub top_n: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            columns: vec![
                ReportColumn::ScreenName,
                ReportColumn::FollowersCount,
                ReportColumn::Joined,
                ReportColumn::Name,
            ],
            sort_by: ReportColumn::FollowersCount,
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Top followers of one account, ready to render
#[derive(Debug, Clone)]
pub struct RankedReport {
    handle: String,
    options: ReportOptions,
    rows: Vec<FollowerRecord>,
    /// Size of the set the rows were ranked from
    population: usize,
}

impl RankedReport {
    pub fn build(mut records: Vec<FollowerRecord>, handle: &str, options: &ReportOptions) -> Self {
        let population = records.len();
        let sort_by = options.sort_by;
        // sort_by is stable, so equal keys keep store order
        records.sort_by(|a, b| sort_by.compare(b, a));
        records.truncate(options.top_n);

        Self {
            handle: handle.to_string(),
            options: options.clone(),
            rows: records,
            population,
        }
    }

    pub fn rows(&self) -> &[FollowerRecord] {
        &self.rows
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn title(&self) -> String {
        format!(
            "Top {} Accounts Following @{}\n(Ranked by {})",
            self.options.top_n,
            self.handle,
            self.options.sort_by.label()
        )
    }

    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return format!("No follower data to display for @{}.\n", self.handle);
        }

        let columns = &self.options.columns;
        let headers: Vec<String> = std::iter::once(String::new())
            .chain(columns.iter().map(|c| c.label().to_string()))
            .collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .enumerate()
            .map(|(rank, record)| {
                std::iter::once((rank + 1).to_string())
                    .chain(columns.iter().map(|c| c.cell(record)))
                    .collect()
            })
            .collect();
        // Rank column is numeric
        let right: Vec<bool> = std::iter::once(true)
            .chain(columns.iter().map(|c| c.right_aligned()))
            .collect();

        let widths: Vec<usize> = (0..headers.len())
            .map(|i| {
                body.iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(headers[i].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let rule = |edge: char, joint: char| {
            let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
            format!("{}{}{}\n", edge, segments.join(joint.to_string().as_str()), edge)
        };
        let line = |cells: &[String]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .zip(&right)
                .map(|((cell, width), right)| pad(cell, *width, *right))
                .collect();
            format!("| {} |\n", padded.join(" | "))
        };

        let mut out = format!("{}\n\n", self.title());
        out.push_str(&rule('+', '+'));
        out.push_str(&line(&headers));
        out.push_str(&rule('|', '+'));
        for row in &body {
            out.push_str(&line(row));
        }
        out.push_str(&rule('+', '+'));
        out
    }
}

impl fmt::Display for RankedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn pad(cell: &str, width: usize, right: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(cell.chars().count()));
    if right {
        format!("{}{}", fill, cell)
    } else {
        format!("{}{}", cell, fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, screen_name: &str, followers: u64, joined: &str) -> FollowerRecord {
        FollowerRecord {
            id: FollowerId::from(id),
            screen_name: screen_name.to_string(),
            display_name: screen_name.to_uppercase(),
            followers_count: followers,
            joined_at: JoinedAt::parse(joined),
            resolved_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_top_one_keeps_largest_account() {
        let records = vec![
            record("1", "small", 50, "N/A"),
            record("2", "large", 200, "N/A"),
        ];
        let options = ReportOptions { top_n: 1, ..ReportOptions::default() };

        let report = RankedReport::build(records, "rustlang", &options);

        assert_eq!(report.rows().len(), 1);
        assert_eq!(report.rows()[0].id.as_str(), "2");
        assert_eq!(report.population(), 2);
        let rendered = report.render();
        assert!(rendered.contains("large"));
        assert!(!rendered.contains("small"));
    }

    #[test]
    fn test_ties_keep_store_order() {
        let records = vec![
            record("1", "first", 10, "N/A"),
            record("2", "second", 10, "N/A"),
            record("3", "third", 99, "N/A"),
        ];
        let report = RankedReport::build(records, "rustlang", &ReportOptions::default());

        let order: Vec<&str> = report.rows().iter().map(|r| r.screen_name.as_str()).collect();
        assert_eq!(order, vec!["third", "first", "second"]);
    }

    #[test]
    fn test_sort_by_join_date_puts_unknown_last() {
        let records = vec![
            record("1", "unknown", 1, "N/A"),
            record("2", "old", 1, "Wed Mar 21 20:50:14 +0000 2006"),
            record("3", "new", 1, "Wed Oct 10 20:19:24 +0000 2018"),
        ];
        let options = ReportOptions { sort_by: ReportColumn::Joined, ..ReportOptions::default() };
        let report = RankedReport::build(records, "rustlang", &options);

        let order: Vec<&str> = report.rows().iter().map(|r| r.screen_name.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "unknown"]);
    }

    #[test]
    fn test_render_psql_table() {
        let records = vec![
            record("1", "ferris", 1234567, "Wed Oct 10 20:19:24 +0000 2018"),
            record("2", "bob", 42, "N/A"),
        ];
        let options = ReportOptions {
            columns: vec![ReportColumn::ScreenName, ReportColumn::FollowersCount, ReportColumn::Joined],
            top_n: 5,
            ..ReportOptions::default()
        };

        let rendered = RankedReport::build(records, "rustlang", &options).render();

        let expected = "\
Top 5 Accounts Following @rustlang
(Ranked by Followers Count)

+---+-------------+-----------------+------------------+
|   | Screen Name | Followers Count | Joined Twitter   |
|---+-------------+-----------------+------------------|
| 1 | ferris      |       1,234,567 | Wed Oct 10, 2018 |
| 2 | bob         |              42 | N/A              |
+---+-------------+-----------------+------------------+
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_empty_report() {
        let report = RankedReport::build(Vec::new(), "ghost", &ReportOptions::default());
        assert!(report.is_empty());
        assert_eq!(report.render(), "No follower data to display for @ghost.\n");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(12345678), "12,345,678");
    }

    #[test]
    fn test_column_parsing() {
        assert_eq!("followers_count".parse::<ReportColumn>(), Ok(ReportColumn::FollowersCount));
        assert_eq!("Screen-Name".parse::<ReportColumn>(), Ok(ReportColumn::ScreenName));
        assert_eq!("created_at".parse::<ReportColumn>(), Ok(ReportColumn::Joined));
        assert!("karma".parse::<ReportColumn>().unwrap_err().contains("expected one of"));
    }

    #[test]
    fn test_numeric_ids_compare_by_value() {
        assert_eq!(compare_ids(&FollowerId::from("9"), &FollowerId::from("10")), Ordering::Less);
        assert_eq!(compare_ids(&FollowerId::from("100"), &FollowerId::from("99")), Ordering::Greater);
    }
}
