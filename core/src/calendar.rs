use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{CalorieEntry, ColorBucket, color_for};

/// Six rows of seven days.
pub const GRID_CELLS: usize = 42;

pub const WEEKDAY_HEADERS: [&str; 7] = ["M", "Tu", "W", "Th", "F", "S", "Su"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    /// Zero when nothing was logged.
    pub calories: u32,
    pub logged: bool,
    pub bucket: ColorBucket,
    pub is_today: bool,
}

impl DayCell {
    /// Calories when logged, otherwise the day of the month.
    pub fn label(&self) -> String {
        if self.calories > 0 {
            self.calories.to_string()
        } else {
            self.date.day().to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub goal: i64,
    /// Always [`GRID_CELLS`] long; `None` pads before the 1st and after the last day.
    pub cells: Vec<Option<DayCell>>,
}

impl MonthView {
    pub fn build(
        year: i32,
        month: u32,
        goal: i64,
        entries: &[CalorieEntry],
        today: NaiveDate,
    ) -> Result<Self> {
        let cells = month_days(year, month)?
            .into_iter()
            .map(|date| {
                date.map(|date| {
                    let entry = entries.iter().find(|e| e.day == date);
                    let calories = entry.map_or(0, |e| e.calories);
                    DayCell {
                        date,
                        calories,
                        logged: entry.is_some(),
                        bucket: color_for(i64::from(calories), goal),
                        is_today: date == today,
                    }
                })
            })
            .collect();
        Ok(Self {
            year,
            month,
            goal,
            cells,
        })
    }

    pub fn weeks(&self) -> impl Iterator<Item = &[Option<DayCell>]> {
        self.cells.chunks(7)
    }

    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.cells.iter().flatten()
    }

    pub fn logged_days(&self) -> usize {
        self.days().filter(|d| d.logged).count()
    }

    pub fn total_calories(&self) -> u64 {
        self.days().map(|d| u64::from(d.calories)).sum()
    }

    pub fn title(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map_or_else(|| format!("{}-{:02}", self.year, self.month), |d| {
                d.format("%B %Y").to_string()
            })
    }
}

/// Dates of a month laid out Monday-first, padded with `None` to 42 cells.
pub fn month_days(year: i32, month: u32) -> Result<Vec<Option<NaiveDate>>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("Invalid month: {year}-{month:02}"))?;
    let lead = first.weekday().num_days_from_monday() as usize;

    let mut cells: Vec<Option<NaiveDate>> = vec![None; lead];
    cells.extend(
        first
            .iter_days()
            .take_while(|d| d.month() == month)
            .map(Some),
    );
    cells.resize(GRID_CELLS, None);
    Ok(cells)
}

/// Parse `YYYY-MM` into `(year, month)`.
pub fn parse_month(s: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{s}'. Use YYYY-MM"))?;
    Ok((date.year(), date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_month_days_layout() {
        // May 2024 starts on a Wednesday
        let cells = month_days(2024, 5).unwrap();
        assert_eq!(cells.len(), GRID_CELLS);
        assert_eq!(cells[0], None);
        assert_eq!(cells[1], None);
        assert_eq!(cells[2], Some(day("2024-05-01")));
        assert_eq!(cells[32], Some(day("2024-05-31")));
        assert!(cells[33..].iter().all(Option::is_none));
    }

    #[test]
    fn test_month_days_starting_monday_and_sunday() {
        // April 2024 starts on a Monday
        assert_eq!(month_days(2024, 4).unwrap()[0], Some(day("2024-04-01")));
        // September 2024 starts on a Sunday
        let sept = month_days(2024, 9).unwrap();
        assert_eq!(sept[6], Some(day("2024-09-01")));
        assert_eq!(sept.iter().flatten().count(), 30);
    }

    #[test]
    fn test_month_days_invalid() {
        assert!(month_days(2024, 13).is_err());
        assert!(month_days(2024, 0).is_err());
    }

    #[test]
    fn test_month_view_buckets() {
        let entries = vec![
            CalorieEntry::new(day("2024-05-01"), 1800),
            CalorieEntry::new(day("2024-05-02"), 1250),
        ];
        let view = MonthView::build(2024, 5, 1200, &entries, day("2024-05-02")).unwrap();

        let first = view.days().find(|d| d.date == day("2024-05-01")).unwrap();
        assert_eq!(first.bucket, ColorBucket::Severe);
        assert_eq!(first.label(), "1800");
        assert!(!first.is_today);

        let second = view.days().find(|d| d.date == day("2024-05-02")).unwrap();
        assert_eq!(second.bucket, ColorBucket::Good);
        assert!(second.is_today);

        let empty = view.days().find(|d| d.date == day("2024-05-03")).unwrap();
        assert!(!empty.logged);
        assert_eq!(empty.bucket, ColorBucket::Neutral);
        assert_eq!(empty.label(), "3");

        assert_eq!(view.logged_days(), 2);
        assert_eq!(view.total_calories(), 3050);
        assert_eq!(view.weeks().count(), 6);
        assert_eq!(view.title(), "May 2024");
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-05").unwrap(), (2024, 5));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("May").is_err());
    }
}
