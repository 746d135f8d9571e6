use anyhow::{Result, bail};
use chrono::Local;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calgrid_core::models::{CalorieEntry, ColorBucket, color_for};
use calgrid_core::service::CalgridService;

use super::helpers::{json_error, paint, parse_date};

/// An entry with its bucket against the current goal.
#[derive(Serialize)]
struct EntryView<'a> {
    #[serde(flatten)]
    entry: &'a CalorieEntry,
    goal: i64,
    over_goal: i64,
    bucket: ColorBucket,
}

impl<'a> EntryView<'a> {
    fn new(entry: &'a CalorieEntry, goal: i64) -> Self {
        let calories = i64::from(entry.calories);
        Self {
            entry,
            goal,
            over_goal: calories - goal,
            bucket: color_for(calories, goal),
        }
    }

    fn describe(&self) -> String {
        let relation = match self.over_goal {
            0 => "at goal".to_string(),
            n if n > 0 => format!("{n} over goal"),
            n => format!("{} under goal", -n),
        };
        format!(
            "{}: {} kcal ({}, {relation})",
            self.entry.day,
            self.entry.calories,
            paint(self.bucket.label(), self.bucket),
        )
    }
}

pub(crate) fn cmd_log(
    svc: &mut CalgridService,
    calories: u32,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let replaced = svc.entry_for(date).map(|e| e.calories);
    let entry = svc.log_calories(date, calories);
    let view = EntryView::new(&entry, svc.goal()?);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Logged {}", view.describe());
    if let Some(old) = replaced {
        println!("  (replaced {old} kcal)");
    }
    Ok(())
}

pub(crate) fn cmd_show(svc: &CalgridService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let goal = svc.goal()?;

    let Some(entry) = svc.entry_for(date) else {
        if json {
            println!("{}", json_error(&format!("No entry for {date}")));
        } else {
            eprintln!("No entry for {date}");
        }
        process::exit(2);
    };

    let view = EntryView::new(entry, goal);
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view.describe());
    }
    Ok(())
}

pub(crate) fn cmd_delete(svc: &mut CalgridService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;

    let Some(entry) = svc.delete_day(date) else {
        if json {
            println!("{}", json_error(&format!("No entry for {date}")));
        } else {
            eprintln!("No entry for {date}");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Deleted {} kcal logged on {date}", entry.calories);
    }
    Ok(())
}

pub(crate) fn cmd_history(svc: &CalgridService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: u32,
        #[tabled(rename = "vs Goal")]
        over_goal: String,
        #[tabled(rename = "Bucket")]
        bucket: String,
    }

    if days == 0 {
        bail!("Days must be at least 1");
    }

    let goal = svc.goal()?;
    let today = Local::now().date_naive();
    let start = today - chrono::Duration::days(i64::from(days) - 1);

    let entries: Vec<CalorieEntry> = svc
        .entries()
        .into_iter()
        .filter(|e| e.day >= start && e.day <= today)
        .rev()
        .collect();
    let views: Vec<EntryView> = entries.iter().map(|e| EntryView::new(e, goal)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        eprintln!("No entries in the last {days} days");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = views
        .iter()
        .map(|v| HistoryRow {
            date: v.entry.day.to_string(),
            calories: v.entry.calories,
            over_goal: format!("{:+}", v.over_goal),
            bucket: v.bucket.label().to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    #[allow(clippy::cast_precision_loss)]
    let avg = views.iter().map(|v| f64::from(v.entry.calories)).sum::<f64>() / views.len() as f64;
    println!("Average: {avg:.0} kcal/day over {} logged days (goal {goal})", views.len());
    Ok(())
}
