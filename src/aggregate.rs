//! Aggregation of responses into per-option results.

use std::fmt::{self, Display, Formatter};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::model::{Question, Rating, StoredResponse};

/// Number of points on the rating scale.
pub const SCALE: usize = Rating::MAX as usize;

/// Shown in place of a percentage while nobody has responded.
pub const NO_RESPONSES: &str = "No responses yet";

/// Qualitative band for an option's percentage score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Usefulness {
    #[serde(rename = "Not useful")]
    NotUseful,
    #[serde(rename = "Slightly useful")]
    SlightlyUseful,
    #[serde(rename = "Useful")]
    Useful,
    #[serde(rename = "Very useful")]
    VeryUseful,
    #[serde(rename = "Most useful")]
    MostUseful,
}

impl Usefulness {
    /// Bands are upper-inclusive: 20 is still "Not useful", 21 is not.
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0..=20 => Self::NotUseful,
            21..=40 => Self::SlightlyUseful,
            41..=60 => Self::Useful,
            61..=80 => Self::VeryUseful,
            _ => Self::MostUseful,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotUseful => "Not useful",
            Self::SlightlyUseful => "Slightly useful",
            Self::Useful => "Useful",
            Self::VeryUseful => "Very useful",
            Self::MostUseful => "Most useful",
        }
    }
}

impl Display for Usefulness {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Results for a single option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSummary {
    pub option: String,
    /// Histogram of ratings; `counts[b]` is the number of `b + 1` ratings.
    pub counts: [u32; SCALE],
    /// Mean rating over all counted responses, in `0..=5`.
    pub average: f64,
    /// The average as a percentage of the top rating, in `0..=100`.
    pub percentage: u8,
    pub usefulness: Usefulness,
    /// What to show for this option.
    pub display: String,
}

/// Aggregated results for a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of responses counted for the question.
    pub total: u32,
    pub options: Vec<OptionSummary>,
}

/// Histogram bucket for a raw rating value, if it is a whole number in range.
fn bucket_of(value: &Bson) -> Option<usize> {
    let rating = match *value {
        Bson::Int32(n) => i64::from(n),
        Bson::Int64(n) => n,
        Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => n as i64,
        _ => return None,
    };
    u8::try_from(rating)
        .ok()
        .and_then(|rating| Rating::try_from(rating).ok())
        .map(Rating::bucket)
}

/// Summarise every response to `question` found among `responses`.
///
/// Responses to other questions, and those without a ratings array, are ignored.
/// A response counts towards the total even if some (or all) of its ratings are
/// missing or invalid; those individual ratings simply contribute nothing.
pub fn aggregate<'a, I>(question: &Question, responses: I) -> Summary
where
    I: IntoIterator<Item = &'a StoredResponse>,
{
    let mut counts = vec![[0u32; SCALE]; question.options.len()];
    let mut total = 0u32;

    for ratings in responses
        .into_iter()
        .filter(|response| response.answers(&question.id))
        .filter_map(StoredResponse::ratings)
    {
        total += 1;
        for (histogram, value) in counts.iter_mut().zip(ratings) {
            if let Some(bucket) = bucket_of(value) {
                histogram[bucket] += 1;
            }
        }
    }

    let options = question
        .options
        .iter()
        .zip(counts)
        .map(|(option, counts)| summarise(option, counts, total))
        .collect();
    Summary { total, options }
}

fn summarise(option: &str, counts: [u32; SCALE], total: u32) -> OptionSummary {
    let sum: u64 = counts
        .iter()
        .zip(1u64..)
        .map(|(count, points)| u64::from(*count) * points)
        .sum();
    let total_wide = u64::from(total);
    let (average, percentage) = if total == 0 {
        (0.0, 0)
    } else {
        // round(sum / total / 5 * 100), halves up, in integer arithmetic.
        let percentage = (40 * sum + total_wide) / (2 * total_wide);
        (sum as f64 / total as f64, percentage.min(100) as u8)
    };
    let display = if total == 0 {
        NO_RESPONSES.to_string()
    } else {
        format!("{percentage}%")
    };
    OptionSummary {
        option: option.to_string(),
        counts,
        average,
        percentage,
        usefulness: Usefulness::from_percentage(percentage),
        display,
    }
}
