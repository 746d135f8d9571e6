use anyhow::Result;
use chrono::{Datelike, Local};
use colored::Colorize;
use rand::seq::IndexedRandom;
use serde::Serialize;

use calgrid_core::calendar::{DayCell, MonthView, WEEKDAY_HEADERS, parse_month};
use calgrid_core::models::{ColorBucket, Message};
use calgrid_core::service::CalgridService;

use super::helpers::paint;

const CELL_WIDTH: usize = 6;

pub(crate) fn cmd_calendar(svc: &CalgridService, month: Option<String>, json: bool) -> Result<()> {
    let (year, month) = match month {
        Some(m) => parse_month(&m)?,
        None => {
            let today = Local::now().date_naive();
            (today.year(), today.month())
        }
    };
    let view = svc.month(year, month)?;
    let messages = svc.messages();
    let message = messages.choose(&mut rand::rng());

    if json {
        #[derive(Serialize)]
        struct CalendarJson<'a> {
            #[serde(flatten)]
            view: &'a MonthView,
            message: Option<&'a Message>,
        }
        let out = CalendarJson {
            view: &view,
            message,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", render_grid(&view));
    println!(
        "{} logged days, {} kcal total, goal {} kcal/day",
        view.logged_days(),
        view.total_calories(),
        view.goal
    );
    println!("{}", legend());
    if let Some(message) = message {
        println!("\n  {}", message.text.italic());
    }
    Ok(())
}

fn render_cell(cell: Option<&DayCell>) -> String {
    let Some(cell) = cell else {
        return " ".repeat(CELL_WIDTH);
    };
    let text = format!("{:^CELL_WIDTH$}", cell.label());
    let painted = paint(&text, cell.bucket);
    if cell.is_today {
        painted.bold().underline().to_string()
    } else {
        painted.to_string()
    }
}

/// Month title, weekday header and six week rows.
pub(crate) fn render_grid(view: &MonthView) -> String {
    let width = CELL_WIDTH * WEEKDAY_HEADERS.len() + WEEKDAY_HEADERS.len() - 1;
    let mut lines = vec![format!("{:^width$}", view.title()).bold().to_string()];
    lines.push(
        WEEKDAY_HEADERS
            .iter()
            .map(|h| format!("{h:^CELL_WIDTH$}"))
            .collect::<Vec<_>>()
            .join(" "),
    );
    for week in view.weeks() {
        lines.push(
            week.iter()
                .map(|c| render_cell(c.as_ref()))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    lines.join("\n")
}

fn legend() -> String {
    ColorBucket::ALL
        .iter()
        .map(|b| paint(&format!(" {} ", b.label()), *b).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use calgrid_core::models::CalorieEntry;
    use chrono::NaiveDate;

    #[test]
    fn test_render_grid_layout() {
        colored::control::set_override(false);
        let may1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let entries = vec![CalorieEntry::new(may1, 1800)];
        let view = MonthView::build(2024, 5, 1200, &entries, may1).unwrap();

        let grid = render_grid(&view);
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0].trim(), "May 2024");
        assert!(lines[1].trim_start().starts_with('M'));
        // May 1st 2024 is a Wednesday, third column
        let first_week = lines[2];
        assert_eq!(&first_week[..2 * (CELL_WIDTH + 1)], " ".repeat(14));
        assert!(first_week.contains(" 1800 "));
        assert!(first_week.contains("  2   "));
        // Every row is the same width
        assert!(lines[1..].iter().all(|l| l.len() == lines[1].len()));
    }

    #[test]
    fn test_legend_lists_every_bucket() {
        colored::control::set_override(false);
        let legend = legend();
        for bucket in ColorBucket::ALL {
            assert!(legend.contains(bucket.label()));
        }
    }
}
