//! Weekly availability schedule and the time-block model
//!
//! An owner's recurring availability is encoded as seven day buckets, each a
//! sorted set of block-start hours. Two block widths exist: the legacy
//! 4-hour encoding (six blocks per day) and the current 3-hour encoding
//! (eight blocks per day).
//!
//! Conversion between the two encodings is done with two explicit one-way
//! tables. They are not inverses of each other: 3h -> 4h is lossy, so a
//! round trip through both tables may widen a schedule.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Block starts of the legacy 4-hour encoding
pub const FOUR_HOUR_BLOCKS: [u8; 6] = [0, 4, 8, 12, 16, 20];

/// Block starts of the current 3-hour encoding
pub const THREE_HOUR_BLOCKS: [u8; 8] = [0, 3, 6, 9, 12, 15, 18, 21];

/// Hours that only appear in 4-hour schedules
const FOUR_HOUR_MARKERS: [u8; 4] = [4, 8, 16, 20];

/// Hours that only appear in 3-hour schedules
const THREE_HOUR_MARKERS: [u8; 6] = [3, 6, 9, 15, 18, 21];

/// Block width of a schedule encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    FourHour,
    ThreeHour,
}

impl Granularity {
    /// Width of one block in hours
    pub fn block_width(&self) -> u8 {
        match self {
            Granularity::FourHour => 4,
            Granularity::ThreeHour => 3,
        }
    }

    /// The fixed set of legal block-start hours
    pub fn block_starts(&self) -> &'static [u8] {
        match self {
            Granularity::FourHour => &FOUR_HOUR_BLOCKS,
            Granularity::ThreeHour => &THREE_HOUR_BLOCKS,
        }
    }

    /// Storage encoding (block width in hours)
    pub fn as_hours(&self) -> i16 {
        self.block_width() as i16
    }

    /// Parse the storage encoding
    pub fn from_hours(hours: i16) -> Option<Self> {
        match hours {
            4 => Some(Granularity::FourHour),
            3 => Some(Granularity::ThreeHour),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::FourHour => write!(f, "4h"),
            Granularity::ThreeHour => write!(f, "3h"),
        }
    }
}

/// Start hour of the block containing `hour`
pub fn block_start(hour: u8, granularity: Granularity) -> u8 {
    let width = granularity.block_width();
    (hour / width) * width
}

/// Fixed weekday keys of the serialized schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKey {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayKey {
    pub const ALL: [DayKey; 7] = [
        DayKey::Sunday,
        DayKey::Monday,
        DayKey::Tuesday,
        DayKey::Wednesday,
        DayKey::Thursday,
        DayKey::Friday,
        DayKey::Saturday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayKey::Sunday => "sunday",
            DayKey::Monday => "monday",
            DayKey::Tuesday => "tuesday",
            DayKey::Wednesday => "wednesday",
            DayKey::Thursday => "thursday",
            DayKey::Friday => "friday",
            DayKey::Saturday => "saturday",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_str() == key)
    }
}

impl From<chrono::Weekday> for DayKey {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => DayKey::Sunday,
            chrono::Weekday::Mon => DayKey::Monday,
            chrono::Weekday::Tue => DayKey::Tuesday,
            chrono::Weekday::Wed => DayKey::Wednesday,
            chrono::Weekday::Thu => DayKey::Thursday,
            chrono::Weekday::Fri => DayKey::Friday,
            chrono::Weekday::Sat => DayKey::Saturday,
        }
    }
}

/// Serialized schedule: weekday key -> sorted block-start hours
pub type ScheduleDays = BTreeMap<DayKey, BTreeSet<u8>>;

/// A weekly availability schedule at a declared granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub granularity: Granularity,
    pub days: ScheduleDays,
}

impl WeeklySchedule {
    /// A schedule with every day present and no available blocks
    pub fn empty(granularity: Granularity) -> Self {
        let days = DayKey::ALL.iter().map(|d| (*d, BTreeSet::new())).collect();
        Self { granularity, days }
    }

    /// A schedule with every block of every day available
    pub fn full(granularity: Granularity) -> Self {
        let blocks: BTreeSet<u8> = granularity.block_starts().iter().copied().collect();
        let days = DayKey::ALL.iter().map(|d| (*d, blocks.clone())).collect();
        Self { granularity, days }
    }

    /// True when no day has any available block
    pub fn is_unrestricted(&self) -> bool {
        self.days.values().all(|blocks| blocks.is_empty())
    }

    /// Available block starts for a weekday (empty when the day is absent)
    pub fn blocks_for(&self, day: DayKey) -> Option<&BTreeSet<u8>> {
        self.days.get(&day).filter(|b| !b.is_empty())
    }

    /// Whether the block containing `hour` is available on `day`
    pub fn is_hour_available(&self, day: DayKey, hour: u8) -> bool {
        self.days
            .get(&day)
            .map(|blocks| blocks.contains(&block_start(hour, self.granularity)))
            .unwrap_or(false)
    }

    /// Every (day, hour) pair this schedule makes available
    pub fn available_hours(&self) -> BTreeSet<(DayKey, u8)> {
        let mut hours = BTreeSet::new();
        for (day, blocks) in &self.days {
            for start in blocks {
                for h in *start..(*start + self.granularity.block_width()).min(24) {
                    hours.insert((*day, h));
                }
            }
        }
        hours
    }

    /// True when every hour available in `other` is also available here
    pub fn covers(&self, other: &WeeklySchedule) -> bool {
        let mine = self.available_hours();
        other.available_hours().iter().all(|h| mine.contains(h))
    }

    /// Convert to another granularity with the one-way tables
    pub fn migrate(&self, to: Granularity) -> WeeklySchedule {
        migrate(self, self.granularity, to)
    }

    /// Build from the serialized JSON map, validating against `granularity`
    pub fn from_json(raw: &JsonValue, granularity: Granularity) -> Result<Self, Vec<String>> {
        let report = validate_schedule(raw, Some(granularity));
        if !report.valid {
            return Err(report.errors);
        }
        let days: ScheduleDays =
            serde_json::from_value(raw.clone()).map_err(|e| vec![e.to_string()])?;
        Ok(Self { granularity, days })
    }

    /// Serialized JSON map in the storage format
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&self.days).unwrap_or(JsonValue::Null)
    }
}

/// One 4-hour block expands to the two 3-hour blocks it overlaps
fn four_to_three(start: u8) -> &'static [u8] {
    match start {
        0 => &[0, 3],
        4 => &[3, 6],
        8 => &[6, 9],
        12 => &[12, 15],
        16 => &[15, 18],
        20 => &[18, 21],
        _ => &[],
    }
}

/// One 3-hour block collapses to a single 4-hour block.
///
/// Blocks 3, 6, 15 and 18 straddle two 4-hour blocks; they resolve to the
/// block holding their start hour.
fn three_to_four(start: u8) -> Option<u8> {
    match start {
        0 | 3 => Some(0),
        6 => Some(4),
        9 => Some(8),
        12 | 15 => Some(12),
        18 => Some(16),
        21 => Some(20),
        _ => None,
    }
}

/// Convert a schedule between granularities.
///
/// Same-granularity migration is the identity. Hours that do not belong to
/// the source granularity are dropped.
pub fn migrate(schedule: &WeeklySchedule, from: Granularity, to: Granularity) -> WeeklySchedule {
    if from == to {
        return WeeklySchedule {
            granularity: to,
            days: schedule.days.clone(),
        };
    }

    let days = schedule
        .days
        .iter()
        .map(|(day, blocks)| {
            let mapped: BTreeSet<u8> = match (from, to) {
                (Granularity::FourHour, Granularity::ThreeHour) => blocks
                    .iter()
                    .flat_map(|b| four_to_three(*b).iter().copied())
                    .collect(),
                _ => blocks.iter().filter_map(|b| three_to_four(*b)).collect(),
            };
            (*day, mapped)
        })
        .collect();

    WeeklySchedule {
        granularity: to,
        days,
    }
}

/// Result of classifying a schedule by the hours it uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedGranularity {
    FourHour,
    ThreeHour,
    /// No discriminating hour present, or hours from both encodings
    Unknown,
}

impl DetectedGranularity {
    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            DetectedGranularity::FourHour => Some(Granularity::FourHour),
            DetectedGranularity::ThreeHour => Some(Granularity::ThreeHour),
            DetectedGranularity::Unknown => None,
        }
    }
}

/// Classify block hours: 4/8/16/20 mean 4-hour, 3/6/9/15/18/21 mean 3-hour
pub fn detect_granularity<'a, I>(hours: I) -> DetectedGranularity
where
    I: IntoIterator<Item = &'a u8>,
{
    let mut four = false;
    let mut three = false;
    for h in hours {
        four |= FOUR_HOUR_MARKERS.contains(h);
        three |= THREE_HOUR_MARKERS.contains(h);
    }
    match (four, three) {
        (true, false) => DetectedGranularity::FourHour,
        (false, true) => DetectedGranularity::ThreeHour,
        _ => DetectedGranularity::Unknown,
    }
}

/// Structured schedule validation report
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleValidation {
    pub valid: bool,
    pub detected_granularity: DetectedGranularity,
    pub errors: Vec<String>,
}

/// Validate a raw serialized schedule.
///
/// Rejects unknown weekday keys, non-array block lists, non-integer entries
/// and block starts outside the granularity's fixed set. When `expected` is
/// `None` the detected granularity is used; an undetectable schedule is only
/// checked against the union of both sets.
pub fn validate_schedule(raw: &JsonValue, expected: Option<Granularity>) -> ScheduleValidation {
    let mut errors = Vec::new();
    let mut hours: Vec<u8> = Vec::new();

    let Some(map) = raw.as_object() else {
        return ScheduleValidation {
            valid: false,
            detected_granularity: DetectedGranularity::Unknown,
            errors: vec!["schedule must be an object keyed by weekday".to_string()],
        };
    };

    let mut entries: Vec<(&String, &Vec<JsonValue>)> = Vec::new();
    for (key, value) in map {
        if DayKey::parse(key).is_none() {
            errors.push(format!("unknown weekday key '{}'", key));
            continue;
        }
        match value.as_array() {
            Some(list) => entries.push((key, list)),
            None => errors.push(format!("blocks for '{}' must be an array", key)),
        }
    }

    for (key, list) in &entries {
        for v in list.iter() {
            match v.as_u64().filter(|h| *h < 24) {
                Some(h) => hours.push(h as u8),
                None => errors.push(format!("'{}' contains non-hour value {}", key, v)),
            }
        }
    }

    let detected = detect_granularity(hours.iter());
    let allowed: Vec<u8> = match expected.or(detected.granularity()) {
        Some(g) => g.block_starts().to_vec(),
        None => {
            let mut union: Vec<u8> = FOUR_HOUR_BLOCKS.to_vec();
            union.extend_from_slice(&THREE_HOUR_BLOCKS);
            union
        }
    };

    for (key, list) in &entries {
        for h in list.iter().filter_map(|v| v.as_u64()).filter(|h| *h < 24) {
            if !allowed.contains(&(h as u8)) {
                errors.push(format!("'{}' has block start {} outside the granularity", key, h));
            }
        }
    }

    if let (Some(g), Some(d)) = (expected, detected.granularity()) {
        if g != d {
            errors.push(format!("declared granularity {} but hours look like {}", g, d));
        }
    }

    ScheduleValidation {
        valid: errors.is_empty(),
        detected_granularity: detected,
        errors,
    }
}
