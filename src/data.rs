use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Tyre compound as reported by the timing feed.
///
/// Parsing is case-insensitive wherever a compound is read, CSV or JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl Compound {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compound {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SOFT" => Ok(Compound::Soft),
            "MEDIUM" => Ok(Compound::Medium),
            "HARD" => Ok(Compound::Hard),
            "INTERMEDIATE" => Ok(Compound::Intermediate),
            "WET" => Ok(Compound::Wet),
            other => Err(format!("unrecognised compound {other:?}")),
        }
    }
}

impl TryFrom<String> for Compound {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

// markers the timing feed uses when it has no compound for a lap
const ABSENT_COMPOUND_MARKERS: &[&str] = &["", "NONE", "NAN", "UNKNOWN", "TEST_UNKNOWN"];

/// One lap of one driver, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LapRecord {
    pub driver: String,
    pub lap_number: u32,
    pub lap_time: Option<Duration>,
    pub compound: Option<Compound>,
    /// Session time at which the car entered the pit lane on this lap.
    pub pit_in_time: Option<Duration>,
    /// Session time at which the car left the pit lane on this lap.
    pub pit_out_time: Option<Duration>,
}

impl LapRecord {
    pub fn lap_time_secs(&self) -> Option<f64> {
        self.lap_time.map(|t| t.as_secs_f64())
    }

    /// A lap with a recorded time that is neither an in-lap nor an out-lap.
    pub fn is_timed_racing_lap(&self) -> bool {
        self.lap_time.is_some() && self.pit_in_time.is_none() && self.pit_out_time.is_none()
    }
}

// renaming the columns of the lap export; everything is read as optional text
// so a missing column or an unparseable value turns into a schema error
// instead of a csv error
#[derive(Debug, Deserialize)]
struct RawLapRecord {
    #[serde(rename = "Driver", default)] driver: Option<String>,
    #[serde(rename = "LapNumber", default)] lap_number: Option<String>,
    #[serde(rename = "LapTime", default)] lap_time: Option<String>,
    #[serde(rename = "Compound", default)] compound: Option<String>,
    #[serde(rename = "PitInTime", default)] pit_in_time: Option<String>,
    #[serde(rename = "PitOutTime", default)] pit_out_time: Option<String>,
}

impl RawLapRecord {
    fn into_record(self, row: usize) -> Result<LapRecord> {
        let driver = self
            .driver
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::schema(row, "missing Driver"))?;

        let lap_number = match number_field(row, "LapNumber", self.lap_number)? {
            None => return Err(Error::schema(row, "missing LapNumber")),
            Some(n) if !n.is_finite() || n < 1.0 || n.fract() != 0.0 || n > u32::MAX as f64 => {
                return Err(Error::schema(
                    row,
                    format!("LapNumber {n} is not a positive whole number"),
                ))
            }
            Some(n) => n as u32,
        };

        let compound = match self.compound.as_deref().map(str::to_uppercase) {
            None => None,
            Some(s) if ABSENT_COMPOUND_MARKERS.contains(&s.as_str()) => None,
            Some(s) => Some(s.parse::<Compound>().map_err(|e| Error::schema(row, e))?),
        };

        Ok(LapRecord {
            driver,
            lap_number,
            lap_time: seconds_field(
                row,
                "LapTime",
                number_field(row, "LapTime", self.lap_time)?,
            )?,
            compound,
            pit_in_time: seconds_field(
                row,
                "PitInTime",
                number_field(row, "PitInTime", self.pit_in_time)?,
            )?,
            pit_out_time: seconds_field(
                row,
                "PitOutTime",
                number_field(row, "PitOutTime", self.pit_out_time)?,
            )?,
        })
    }
}

fn number_field(row: usize, column: &str, value: Option<String>) -> Result<Option<f64>> {
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::schema(row, format!("{column} {text:?} is not a number"))),
    }
}

// NaN is how dataframe exports spell "no value", so it reads as absent
fn seconds_field(row: usize, column: &str, value: Option<f64>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_nan() => Ok(None),
        Some(v) if v.is_infinite() || v < 0.0 => Err(Error::schema(
            row,
            format!("{column} {v} is not a valid number of seconds"),
        )),
        Some(v) => Duration::try_from_secs_f64(v)
            .map(Some)
            .map_err(|e| Error::schema(row, format!("{column} {v}: {e}"))),
    }
}

/// Reads lap records from CSV with a header row.
///
/// The first malformed row aborts the read; rows are numbered from 1 after
/// the header.
pub fn read_laps<R: io::Read>(reader: R) -> Result<Vec<LapRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut laps = Vec::new();
    for (idx, res) in reader.deserialize().enumerate() {
        let raw: RawLapRecord = res?;
        laps.push(raw.into_record(idx + 1)?);
    }
    debug!(rows = laps.len(), "read lap records");
    Ok(laps)
}

pub fn load_laps<P: AsRef<Path>>(path: P) -> Result<Vec<LapRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_laps(io::BufReader::new(file))
}

/// Drops laps without a time, in-laps and out-laps. Order is preserved.
pub fn clean(laps: &[LapRecord]) -> Vec<LapRecord> {
    let cleaned: Vec<LapRecord> = laps
        .iter()
        .filter(|lap| lap.is_timed_racing_lap())
        .cloned()
        .collect();
    debug!(
        kept = cleaned.len(),
        dropped = laps.len() - cleaned.len(),
        "cleaned laps"
    );
    cleaned
}


#[cfg(test)]
mod tests {
    use super::test_support::lap;
    use super::*;

    const HEADER: &str = "Driver,LapNumber,LapTime,Compound,PitInTime,PitOutTime\n";

    #[test]
    fn reads_blank_fields_as_absent() {
        let csv = format!(
            "{HEADER}VER,1,92.5,soft,,3605.1\nVER,2,91.0,SOFT,,\nVER,3,,SOFT,,\nVER,4,95.2,UNKNOWN,3900.0,\n"
        );
        let laps = read_laps(csv.as_bytes()).unwrap();

        assert_eq!(laps.len(), 4);
        assert_eq!(laps[0].compound, Some(Compound::Soft));
        assert!(laps[0].pit_out_time.is_some());
        assert_eq!(laps[1].lap_time_secs(), Some(91.0));
        assert!(laps[2].lap_time.is_none());
        assert!(laps[3].compound.is_none());
        assert!(laps[3].pit_in_time.is_some());
    }

    #[test]
    fn nan_times_are_absent() {
        let csv = format!("{HEADER}HAM,5,NaN,HARD,NaN,NaN\n");
        let laps = read_laps(csv.as_bytes()).unwrap();
        assert!(laps[0].lap_time.is_none());
        assert!(laps[0].pit_in_time.is_none());
    }

    #[test]
    fn missing_driver_is_schema_error() {
        let csv = format!("{HEADER}VER,1,92.5,SOFT,,\n,2,91.0,SOFT,,\n");
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DataSchema { row: 2, .. }), "{err}");
    }

    #[test]
    fn missing_lap_number_column_is_schema_error() {
        let csv = "Driver,LapTime,Compound,PitInTime,PitOutTime\nVER,92.5,SOFT,,\n";
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing LapNumber"));
    }

    #[test]
    fn fractional_lap_number_is_rejected() {
        let csv = format!("{HEADER}VER,1.5,92.5,SOFT,,\n");
        assert!(matches!(
            read_laps(csv.as_bytes()),
            Err(Error::DataSchema { row: 1, .. })
        ));
    }

    #[test]
    fn zero_lap_number_is_rejected() {
        let csv = format!("{HEADER}VER,0,92.5,SOFT,,\n");
        assert!(matches!(read_laps(csv.as_bytes()), Err(Error::DataSchema { row: 1, .. })));
    }

    #[test]
    fn non_numeric_lap_number_is_schema_error() {
        let csv = format!("{HEADER}VER,1,92.5,SOFT,,\nVER,abc,92.5,SOFT,,\n");
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DataSchema { row: 2, .. }), "{err}");
        assert!(err.to_string().contains("LapNumber \"abc\" is not a number"));
    }

    #[test]
    fn timedelta_text_lap_time_is_schema_error() {
        let csv = format!("{HEADER}VER,1,0 days 00:01:32.5,SOFT,,\n");
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DataSchema { row: 1, .. }), "{err}");
        assert!(err.to_string().contains("LapTime"));
    }

    #[test]
    fn timestamp_pit_in_time_is_schema_error() {
        let csv = format!("{HEADER}VER,1,92.5,SOFT,2025-04-01 10:00,\n");
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("PitInTime"), "{err}");
    }

    #[test]
    fn infinite_lap_time_is_rejected() {
        let csv = format!("{HEADER}VER,1,inf,SOFT,,\n");
        assert!(matches!(read_laps(csv.as_bytes()), Err(Error::DataSchema { row: 1, .. })));
    }

    #[test]
    fn missing_driver_column_is_schema_error() {
        let csv = "LapNumber,LapTime,Compound,PitInTime,PitOutTime\n1,92.5,SOFT,,\n";
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DataSchema { row: 1, .. }));
        assert!(err.to_string().contains("missing Driver"));
    }

    #[test]
    fn unknown_compound_string_is_rejected() {
        let csv = format!("{HEADER}VER,1,92.5,HYPERSOFT,,\n");
        let err = read_laps(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("HYPERSOFT"));
    }

    #[test]
    fn negative_lap_time_is_rejected() {
        let csv = format!("{HEADER}VER,1,-3,SOFT,,\n");
        assert!(read_laps(csv.as_bytes()).is_err());
    }

    #[test]
    fn clean_drops_untimed_and_pit_laps() {
        let mut in_lap = lap("VER", 2, 95.0, Compound::Soft);
        in_lap.pit_in_time = Some(Duration::from_secs(3600));
        let mut out_lap = lap("VER", 3, 110.0, Compound::Hard);
        out_lap.pit_out_time = Some(Duration::from_secs(3625));
        let mut untimed = lap("VER", 4, 0.0, Compound::Hard);
        untimed.lap_time = None;

        let laps = vec![
            lap("VER", 1, 91.0, Compound::Soft),
            in_lap,
            out_lap,
            untimed,
            lap("VER", 5, 92.0, Compound::Hard),
        ];
        let cleaned = clean(&laps);

        let numbers: Vec<u32> = cleaned.iter().map(|l| l.lap_number).collect();
        assert_eq!(numbers, vec![1, 5]);
        assert!(cleaned.iter().all(LapRecord::is_timed_racing_lap));
    }

    #[test]
    fn clean_is_idempotent() {
        let mut in_lap = lap("LEC", 3, 95.0, Compound::Medium);
        in_lap.pit_in_time = Some(Duration::from_secs(4000));
        let laps = vec![
            lap("LEC", 2, 91.0, Compound::Medium),
            in_lap,
            lap("LEC", 1, 90.0, Compound::Medium),
        ];

        let once = clean(&laps);
        assert_eq!(clean(&once), once);
        // relative order kept
        assert_eq!(once[0].lap_number, 2);
        assert_eq!(once[1].lap_number, 1);
    }

    #[test]
    fn compound_parse_is_case_insensitive() {
        assert_eq!("medium".parse::<Compound>(), Ok(Compound::Medium));
        assert_eq!(" Hard ".parse::<Compound>(), Ok(Compound::Hard));
        assert!("C3".parse::<Compound>().is_err());
        assert_eq!(serde_json::from_str::<Compound>("\"soft\"").unwrap(), Compound::Soft);
        assert!(serde_json::from_str::<Compound>("\"C3\"").is_err());
        assert_eq!(serde_json::to_string(&Compound::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(Compound::Intermediate.to_string(), "INTERMEDIATE");
    }
}
