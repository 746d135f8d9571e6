use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CALORIE_GOAL: i64 = 1200;

/// Messages shipped with the app. Shown on first launch.
pub const DEFAULT_MESSAGES: &[&str] = &[
    "wait until you're really hungry and then eat until you're really full",
    "stop thinking about food and go make some art",
    "eating too many carbs will give you yeast infections",
    "you can eat at a 40% calorie deficit and still maintain muscle mass if you eat 2.2g of protein per kg lean body mass",
    "eat soup",
    "take your supplements",
];

/// Namespace for the v5 ids of the default messages, so every install derives
/// the same id for the same default text.
const DEFAULT_MESSAGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_4b7d_4e0a_9c53_d1e8_a4f2_7b90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    DayCalories,
    Message,
}

impl RecordKind {
    pub const ALL: &'static [RecordKind] = &[RecordKind::DayCalories, RecordKind::Message];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DayCalories => "DayCalories",
            Self::Message => "Message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calories logged for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalorieEntry {
    pub id: Uuid,
    pub day: NaiveDate,
    pub calories: u32,
}

impl CalorieEntry {
    pub fn new(day: NaiveDate, calories: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            day,
            calories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
        }
    }

    /// A default message with its deterministic id.
    pub fn default_for(text: &str) -> Self {
        Self {
            id: Uuid::new_v5(&DEFAULT_MESSAGE_NAMESPACE, text.as_bytes()),
            text: text.to_string(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        DEFAULT_MESSAGES.iter().map(|t| Self::default_for(t)).collect()
    }

    pub fn is_default(&self) -> bool {
        DEFAULT_MESSAGES
            .iter()
            .any(|t| Self::default_for(t).id == self.id)
    }
}

/// How far a day's calories landed above the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBucket {
    /// Under goal.
    Neutral,
    Good,
    Mild,
    Moderate,
    Severe,
    Extreme,
}

impl ColorBucket {
    pub const ALL: &'static [ColorBucket] = &[
        ColorBucket::Neutral,
        ColorBucket::Good,
        ColorBucket::Mild,
        ColorBucket::Moderate,
        ColorBucket::Severe,
        ColorBucket::Extreme,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Good => "good",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Extreme => "extreme",
        }
    }

    /// Colour the calendar paints the day with.
    pub fn color_name(self) -> &'static str {
        match self {
            Self::Neutral => "gray",
            Self::Good => "green",
            Self::Mild => "yellow",
            Self::Moderate => "orange",
            Self::Severe => "red",
            Self::Extreme => "black",
        }
    }
}

impl fmt::Display for ColorBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bucket for `calories - goal`. Boundaries are inclusive on the low end:
/// `<0`, `[0,100)`, `[100,200)`, `[200,500)`, `[500,1000)`, `>=1000`.
pub fn color_for(calories: i64, goal: i64) -> ColorBucket {
    match calories.saturating_sub(goal) {
        i64::MIN..0 => ColorBucket::Neutral,
        0..100 => ColorBucket::Good,
        100..200 => ColorBucket::Mild,
        200..500 => ColorBucket::Moderate,
        500..1000 => ColorBucket::Severe,
        _ => ColorBucket::Extreme,
    }
}

pub fn validate_goal(goal: i64) -> Result<i64> {
    if goal <= 0 {
        bail!("Calorie goal must be greater than 0");
    }
    Ok(goal)
}

pub fn validate_message_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("Message text cannot be empty");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_for_boundaries() {
        let goal = 1200;
        assert_eq!(color_for(1199, goal), ColorBucket::Neutral);
        assert_eq!(color_for(1200, goal), ColorBucket::Good);
        assert_eq!(color_for(1299, goal), ColorBucket::Good);
        assert_eq!(color_for(1300, goal), ColorBucket::Mild);
        assert_eq!(color_for(1399, goal), ColorBucket::Mild);
        assert_eq!(color_for(1400, goal), ColorBucket::Moderate);
        assert_eq!(color_for(1699, goal), ColorBucket::Moderate);
        assert_eq!(color_for(1700, goal), ColorBucket::Severe);
        assert_eq!(color_for(2199, goal), ColorBucket::Severe);
        assert_eq!(color_for(2200, goal), ColorBucket::Extreme);
    }

    #[test]
    fn test_color_for_scenario_1800_over_1200() {
        // 600 over goal falls in [500, 1000)
        assert_eq!(color_for(1800, 1200), ColorBucket::Severe);
    }

    #[test]
    fn test_color_for_is_total() {
        assert_eq!(color_for(i64::MIN, i64::MAX), ColorBucket::Neutral);
        assert_eq!(color_for(i64::MAX, i64::MIN), ColorBucket::Extreme);
        assert_eq!(color_for(0, 0), ColorBucket::Good);
        assert_eq!(color_for(-50, -100), ColorBucket::Good);
    }

    #[test]
    fn test_color_for_buckets_shift_with_goal() {
        for goal in [-500, 0, 1, 1200, 3000] {
            for (offset, bucket) in [
                (-1, ColorBucket::Neutral),
                (0, ColorBucket::Good),
                (100, ColorBucket::Mild),
                (200, ColorBucket::Moderate),
                (500, ColorBucket::Severe),
                (1000, ColorBucket::Extreme),
            ] {
                assert_eq!(color_for(goal + offset, goal), bucket, "goal {goal} offset {offset}");
            }
        }
    }

    #[test]
    fn test_bucket_colors() {
        let colors: Vec<&str> = ColorBucket::ALL.iter().map(|b| b.color_name()).collect();
        assert_eq!(colors, ["gray", "green", "yellow", "orange", "red", "black"]);
    }

    #[test]
    fn test_default_messages_have_stable_ids() {
        let a = Message::defaults();
        let b = Message::defaults();
        assert_eq!(a.len(), DEFAULT_MESSAGES.len());
        assert_eq!(a, b);
        assert!(a.iter().all(Message::is_default));
        assert!(!Message::new("eat soup").is_default());
    }

    #[test]
    fn test_validate_goal() {
        assert_eq!(validate_goal(1500).unwrap(), 1500);
        assert!(validate_goal(0).is_err());
        assert!(validate_goal(-1).is_err());
    }

    #[test]
    fn test_validate_message_text() {
        assert_eq!(validate_message_text("  eat soup ").unwrap(), "eat soup");
        assert!(validate_message_text("   ").is_err());
        assert!(validate_message_text("").is_err());
    }

    #[test]
    fn test_record_kind_parse() {
        assert_eq!(RecordKind::parse("DayCalories"), Some(RecordKind::DayCalories));
        assert_eq!(RecordKind::parse("Message"), Some(RecordKind::Message));
        assert_eq!(RecordKind::parse("message"), None);
    }
}
