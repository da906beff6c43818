//! Fills gaps in a per-year date histogram so every year between the observed ones has a bar.

use serde::{Deserialize, Serialize};

/// Term of the bucket that counts documents without a date.
pub const MISSING_VALUE_TERM: &str = "-_exists_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub term: String,
    pub count: u64,
}

impl Bucket {
    pub fn new(term: impl Into<String>, count: u64) -> Self {
        Self {
            term: term.into(),
            count,
        }
    }

    pub fn year(&self) -> Option<i32> {
        year_of(&self.term)
    }
}

/// Reads the year out of `"2019"` or `"2019-05-01"`. The missing-value bucket has no year.
pub fn year_of(term: &str) -> Option<i32> {
    if term == MISSING_VALUE_TERM {
        return None;
    }
    let year = term.split('-').next()?;
    if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}

#[derive(Debug, Clone, Copy)]
pub struct FillOptions {
    /// Extend with empty buckets up to this year, inclusive.
    pub end_year: Option<i32>,
    /// Term given to synthesized buckets.
    pub label: fn(i32) -> String,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            end_year: None,
            label: |year| year.to_string(),
        }
    }
}

pub fn add_missing_years(buckets: &[Bucket]) -> Vec<Bucket> {
    add_missing_years_with(buckets, &FillOptions::default())
}

/// Inserts a zero bucket for every year missing between two consecutive dated buckets.
///
/// Buckets are expected in ascending year order. Anything without a year (the
/// missing-value bucket, malformed terms) is kept where it is and does not interrupt a gap.
pub fn add_missing_years_with(buckets: &[Bucket], options: &FillOptions) -> Vec<Bucket> {
    let mut filled = Vec::with_capacity(buckets.len());
    let mut last_year: Option<i32> = None;

    for bucket in buckets {
        if let Some(year) = bucket.year() {
            if let Some(previous) = last_year {
                for missing in previous.saturating_add(1)..year {
                    filled.push(Bucket::new((options.label)(missing), 0));
                }
            }
            last_year = Some(last_year.map_or(year, |previous| previous.max(year)));
        }
        filled.push(bucket.clone());
    }

    // nothing follows i32::MAX, so a last year of MAX has no extension
    let next_year = last_year.and_then(|last| last.checked_add(1));
    if let (Some(first), Some(end)) = (next_year, options.end_year) {
        // keep a trailing missing-value bucket at the end
        let tail_at = filled
            .iter()
            .rposition(|b| b.year().is_some())
            .map_or(filled.len(), |i| i + 1);
        let extension = (first..=end).map(|year| Bucket::new((options.label)(year), 0));
        filled.splice(tail_at..tail_at, extension);
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(buckets: &[Bucket]) -> Vec<&str> {
        buckets.iter().map(|b| b.term.as_str()).collect()
    }

    #[test]
    fn test_fills_gap_between_years() {
        let input = vec![Bucket::new("2019", 5), Bucket::new("2022", 2)];
        let filled = add_missing_years(&input);
        assert_eq!(terms(&filled), vec!["2019", "2020", "2021", "2022"]);
        assert_eq!(filled[1].count, 0);
        assert_eq!(filled[2].count, 0);
        assert_eq!(filled[3].count, 2);
    }

    #[test]
    fn test_contiguous_input_unchanged() {
        let input = vec![Bucket::new("2020", 1), Bucket::new("2021", 1)];
        assert_eq!(add_missing_years(&input), input);
        assert!(add_missing_years(&[]).is_empty());
    }

    #[test]
    fn test_sentinel_is_kept_and_ignored() {
        let input = vec![
            Bucket::new(MISSING_VALUE_TERM, 7),
            Bucket::new("2018", 1),
            Bucket::new("2020", 3),
        ];
        let filled = add_missing_years(&input);
        assert_eq!(terms(&filled), vec!["-_exists_", "2018", "2019", "2020"]);
        assert_eq!(filled[0].count, 7);
    }

    #[test]
    fn test_unparseable_terms_pass_through() {
        let input = vec![
            Bucket::new("2010", 1),
            Bucket::new("unknown", 4),
            Bucket::new("2012", 1),
        ];
        let filled = add_missing_years(&input);
        assert_eq!(terms(&filled), vec!["2010", "unknown", "2011", "2012"]);
    }

    #[test]
    fn test_date_terms() {
        assert_eq!(year_of("2019-05-01"), Some(2019));
        assert_eq!(year_of("-_exists_"), None);
        assert_eq!(year_of("abc"), None);
        let input = vec![Bucket::new("2019-01-01", 1), Bucket::new("2021-01-01", 1)];
        assert_eq!(terms(&add_missing_years(&input)), vec!["2019-01-01", "2020", "2021-01-01"]);
    }

    #[test]
    fn test_end_year_and_label() {
        let input = vec![Bucket::new("2021", 1), Bucket::new(MISSING_VALUE_TERM, 2)];
        let options = FillOptions {
            end_year: Some(2023),
            label: |year| format!("{year}-01-01"),
        };
        let filled = add_missing_years_with(&input, &options);
        assert_eq!(
            terms(&filled),
            vec!["2021", "2022-01-01", "2023-01-01", "-_exists_"]
        );
    }

    #[test]
    fn test_end_year_before_last_is_noop() {
        let input = vec![Bucket::new("2021", 1)];
        let options = FillOptions {
            end_year: Some(2020),
            ..FillOptions::default()
        };
        assert_eq!(add_missing_years_with(&input, &options), input);
    }

    #[test]
    fn test_largest_year_does_not_overflow() {
        let input = vec![Bucket::new("2147483647", 1), Bucket::new("2147483647-06-01", 1)];
        assert_eq!(add_missing_years(&input), input);

        let options = FillOptions {
            end_year: Some(i32::MAX),
            ..FillOptions::default()
        };
        assert_eq!(add_missing_years_with(&input, &options), input);

        let near_max = vec![Bucket::new("2147483645", 1)];
        let filled = add_missing_years_with(&near_max, &options);
        assert_eq!(terms(&filled), vec!["2147483645", "2147483646", "2147483647"]);
    }
}
