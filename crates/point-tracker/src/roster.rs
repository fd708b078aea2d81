//! The roster: owned collection of streamers plus its CSV persistence.
//!
//! CSV rows carry one observation each: `name,points,date,target`, without a
//! header. Dates are written as RFC 3339 UTC; the reader also accepts the
//! legacy naive `%Y-%m-%d %H:%M:%S%.f` form, interpreted as local time.

use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use uuid::Uuid;

use crate::types::{Observation, Streamer, TrackerError, TrackerResult};

const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Owned, name-unique collection of streamers in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    streamers: Vec<Streamer>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value for `name`, creating the streamer on first sight.
    ///
    /// A `target` of `Some` replaces the stored target; `None` leaves it as is.
    pub fn record(
        &mut self,
        name: &str,
        value: f64,
        at: DateTime<Utc>,
        target: Option<f64>,
    ) -> TrackerResult<&Streamer> {
        check_name(name)?;
        check_value("points", value)?;
        if let Some(t) = target {
            check_value("target", t)?;
        }

        let obs = Observation::new(at, value);
        let idx = match self.position(name) {
            Some(idx) => {
                let streamer = &mut self.streamers[idx];
                streamer.push(obs);
                if target.is_some() {
                    streamer.target = target;
                }
                idx
            }
            None => {
                tracing::info!("New streamer: {name}");
                self.streamers.push(Streamer::new(name, obs, target));
                self.streamers.len() - 1
            }
        };
        Ok(&self.streamers[idx])
    }

    /// Get a streamer by exact name.
    pub fn get(&self, name: &str) -> Option<&Streamer> {
        self.streamers.iter().find(|s| s.name == name)
    }

    /// Get a streamer by identity.
    pub fn get_by_id(&self, id: Uuid) -> Option<&Streamer> {
        self.streamers.iter().find(|s| s.id == id)
    }

    /// Get a streamer by name or fail with `StreamerNotFound`.
    pub fn require(&self, name: &str) -> TrackerResult<&Streamer> {
        self.get(name)
            .ok_or_else(|| TrackerError::StreamerNotFound(name.to_string()))
    }

    /// Set or clear a streamer's target.
    pub fn set_target(&mut self, name: &str, target: Option<f64>) -> TrackerResult<&Streamer> {
        if let Some(t) = target {
            check_value("target", t)?;
        }
        let idx = self
            .position(name)
            .ok_or_else(|| TrackerError::StreamerNotFound(name.to_string()))?;
        self.streamers[idx].target = target;
        Ok(&self.streamers[idx])
    }

    /// Change a streamer's display name. Identity is unchanged.
    pub fn rename(&mut self, old: &str, new: &str) -> TrackerResult<&Streamer> {
        check_name(new)?;
        let idx = self
            .position(old)
            .ok_or_else(|| TrackerError::StreamerNotFound(old.to_string()))?;
        if old != new && self.position(new).is_some() {
            return Err(TrackerError::NameTaken(new.to_string()));
        }
        self.streamers[idx].name = new.to_string();
        Ok(&self.streamers[idx])
    }

    /// Remove a streamer wholesale.
    pub fn remove(&mut self, name: &str) -> TrackerResult<Streamer> {
        let idx = self
            .position(name)
            .ok_or_else(|| TrackerError::StreamerNotFound(name.to_string()))?;
        Ok(self.streamers.remove(idx))
    }

    /// Return the number of streamers.
    pub fn count(&self) -> usize {
        self.streamers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streamers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Streamer> {
        self.streamers.iter()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.streamers.iter().map(|s| s.name.clone()).collect()
    }

    /// Total observations across all streamers.
    pub fn observation_count(&self) -> usize {
        self.streamers.iter().map(Streamer::count).sum()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.streamers.iter().position(|s| s.name == name)
    }
}

/// Writer for roster CSV files.
pub struct RosterWriter;

/// Reader for roster CSV files.
pub struct RosterReader;

impl RosterWriter {
    /// Write the whole roster to a file.
    pub fn write_to_file(roster: &Roster, path: &Path) -> TrackerResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        Self::write_to(roster, file)?;
        tracing::debug!(
            "Wrote {} streamers ({} rows) to {}",
            roster.count(),
            roster.observation_count(),
            path.display()
        );
        Ok(())
    }

    /// Write the whole roster to any writer.
    pub fn write_to<W: Write>(roster: &Roster, writer: W) -> TrackerResult<()> {
        let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        for streamer in roster.iter() {
            let target = streamer.target.map(|t| t.to_string()).unwrap_or_default();
            for obs in &streamer.observations {
                let value = obs.value.to_string();
                let at = obs.at.to_rfc3339_opts(SecondsFormat::Micros, true);
                csv.write_record([
                    streamer.name.as_str(),
                    value.as_str(),
                    at.as_str(),
                    target.as_str(),
                ])?;
            }
        }
        csv.flush()?;
        Ok(())
    }
}

impl RosterReader {
    /// Read a roster from a file.
    pub fn read_from_file(path: &Path) -> TrackerResult<Roster> {
        let file = std::fs::File::open(path)?;
        let roster = Self::read_from(file)?;
        tracing::debug!(
            "Read {} streamers ({} rows) from {}",
            roster.count(),
            roster.observation_count(),
            path.display()
        );
        Ok(roster)
    }

    /// Read a roster from any reader.
    ///
    /// Rows sharing a name append to the same streamer in file order; the last
    /// non-empty target wins.
    pub fn read_from<R: Read>(reader: R) -> TrackerResult<Roster> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut roster = Roster::new();
        for (idx, record) in csv.records().enumerate() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 1);
            let invalid = |reason: String| TrackerError::InvalidRecord { line, reason };

            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            if record.len() < 3 {
                return Err(invalid(format!("expected at least 3 fields, got {}", record.len())));
            }

            let name = &record[0];
            let value: f64 = record[1]
                .parse()
                .map_err(|e| invalid(format!("bad points '{}': {e}", &record[1])))?;
            let at = parse_date(&record[2]).ok_or_else(|| invalid(format!("bad date '{}'", &record[2])))?;
            let target = match record.get(3) {
                Some(raw) if !raw.is_empty() => Some(
                    raw.parse::<f64>()
                        .map_err(|e| invalid(format!("bad target '{raw}': {e}")))?,
                ),
                _ => None,
            };

            roster
                .record(name, value, at, target)
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(roster)
    }
}

/// Parse an RFC 3339 instant, or a legacy naive timestamp in local time.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, LEGACY_DATE_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn check_name(name: &str) -> TrackerResult<()> {
    if name.trim().is_empty() {
        return Err(TrackerError::InvalidValue("streamer name is empty".to_string()));
    }
    Ok(())
}

fn check_value(field: &str, value: f64) -> TrackerResult<()> {
    if !value.is_finite() {
        return Err(TrackerError::InvalidValue(format!("{field} must be finite, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_record_creates_then_appends() {
        let mut roster = Roster::new();
        let id = roster.record("Alice", 100.0, day(0), Some(300.0)).unwrap().id;
        let again = roster.record("Alice", 150.0, day(1), None).unwrap();

        assert_eq!(again.id, id);
        assert_eq!(again.count(), 2);
        assert_eq!(again.target, Some(300.0));
        assert_eq!(roster.count(), 1);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut roster = Roster::new();
        roster.record("alice", 1.0, day(0), None).unwrap();
        roster.record("Alice", 1.0, day(0), None).unwrap();
        assert_eq!(roster.count(), 2);
    }

    #[test]
    fn test_rename_keeps_identity() {
        let mut roster = Roster::new();
        let id = roster.record("Alice", 1.0, day(0), None).unwrap().id;
        roster.rename("Alice", "Alicia").unwrap();

        assert!(roster.get("Alice").is_none());
        assert_eq!(roster.get("Alicia").unwrap().id, id);
        assert_eq!(roster.get_by_id(id).unwrap().name, "Alicia");
    }

    #[test]
    fn test_rename_collision_rejected() {
        let mut roster = Roster::new();
        roster.record("Alice", 1.0, day(0), None).unwrap();
        roster.record("Bob", 1.0, day(0), None).unwrap();
        assert!(matches!(
            roster.rename("Alice", "Bob"),
            Err(TrackerError::NameTaken(_))
        ));
        assert!(matches!(
            roster.rename("Zed", "Zoe"),
            Err(TrackerError::StreamerNotFound(_))
        ));
    }

    #[test]
    fn test_remove_and_missing() {
        let mut roster = Roster::new();
        roster.record("Alice", 1.0, day(0), None).unwrap();
        assert_eq!(roster.remove("Alice").unwrap().name, "Alice");
        assert!(roster.is_empty());
        assert!(matches!(
            roster.remove("Alice"),
            Err(TrackerError::StreamerNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut roster = Roster::new();
        assert!(roster.record("", 1.0, day(0), None).is_err());
        assert!(roster.record("Alice", f64::INFINITY, day(0), None).is_err());
        assert!(roster.record("Alice", 1.0, day(0), Some(f64::NAN)).is_err());
        assert!(roster.is_empty());
    }

    #[test]
    fn test_separate_rosters_do_not_share_state() {
        let mut a = Roster::new();
        let b = Roster::new();
        a.record("Alice", 1.0, day(0), None).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn test_csv_roundtrip() {
        let mut roster = Roster::new();
        roster.record("Alice", 100.0, day(0), Some(300.0)).unwrap();
        roster.record("Alice", 200.5, day(10), None).unwrap();
        roster.record("Bob, Jr.", 50.0, day(1), None).unwrap();

        let mut buf = Vec::new();
        RosterWriter::write_to(&roster, &mut buf).unwrap();
        let loaded = RosterReader::read_from(&buf[..]).unwrap();

        assert_eq!(loaded.names(), vec!["Alice".to_string(), "Bob, Jr.".to_string()]);
        let alice = loaded.get("Alice").unwrap();
        assert_eq!(alice.observations, roster.get("Alice").unwrap().observations);
        assert_eq!(alice.target, Some(300.0));
        assert_eq!(loaded.get("Bob, Jr.").unwrap().target, None);
    }

    #[test]
    fn test_reads_legacy_rows() {
        let csv = "Alice,100,2024-01-01 10:00:00.000000,300\nAlice,120,2024-01-02 10:00:00.5\nBob,7,2024-01-01T00:00:00Z\n";
        let roster = RosterReader::read_from(csv.as_bytes()).unwrap();

        let alice = roster.get("Alice").unwrap();
        assert_eq!(alice.count(), 2);
        assert_eq!(alice.target, Some(300.0));
        let gap = alice.observations[1].at - alice.observations[0].at;
        assert_eq!(gap.num_milliseconds(), 86_400_500);
        let bob = roster.get("Bob").unwrap();
        assert_eq!(bob.observations[0].at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_bad_row_reports_line() {
        let csv = "Alice,100,2024-01-01T00:00:00Z\nAlice,lots,2024-01-02T00:00:00Z\n";
        let err = RosterReader::read_from(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_short_row_rejected() {
        let err = RosterReader::read_from("Alice,100\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidRecord { .. }));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");

        let mut roster = Roster::new();
        roster.record("Alice", 1.0, day(0), None).unwrap();
        RosterWriter::write_to_file(&roster, &path).unwrap();
        let loaded = RosterReader::read_from_file(&path).unwrap();
        assert_eq!(loaded.count(), 1);
    }
}
