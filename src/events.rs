//! Custom three-column timing files for the stop-signal task, derived from
//! BIDS `events.tsv` files.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use entities::Entities;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub onset: f64,
    pub duration: f64,
    pub trial_type: String,
}

/// The explanatory variables of the stop-signal task model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Condition {
    CorrGo,
    IncorrGo,
    CorrStop,
    IncorrStop,
}

impl Condition {
    pub const ALL: [Condition; 4] = [Self::CorrGo, Self::IncorrGo, Self::CorrStop, Self::IncorrStop];

    pub fn name(self) -> &'static str {
        match self {
            Self::CorrGo     => "corrGo",
            Self::IncorrGo   => "incorrGo",
            Self::CorrStop   => "corrStop",
            Self::IncorrStop => "incorrStop",
        }
    }

    pub fn trial_type(self) -> &'static str {
        match self {
            Self::CorrGo     => "correct_go",
            Self::IncorrGo   => "incorrect_go",
            Self::CorrStop   => "correct_stop",
            Self::IncorrStop => "incorrect_stop",
        }
    }
}

/// How onsets are adjusted once the leading dummy event is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnsetPolicy {
    /// Only the first remaining onset is set to zero
    #[default]
    ZeroFirst,
    /// Every onset is shifted so that the first is zero, then rounded to
    /// hundredths of a second
    Offset,
}

pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| headers.iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::MissingColumn { path: path.into(), column: name });
    let (onset, duration, trial_type) = (column("onset")?, column("duration")?, column("trial_type")?);

    let number = |record: &csv::StringRecord, i: usize, line: usize| -> Result<f64> {
        let text = record.get(i).unwrap_or("").trim();
        text.parse().map_err(|_| Error::Invalid(format!(
            "{}:{line}: `{text}` is not a number", path.display()
        )))
    };

    let mut events = vec![];
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        let line = n + 2; // 1-based, after the header
        events.push(Event {
            onset:    number(&record, onset   , line)?,
            duration: number(&record, duration, line)?,
            trial_type: record.get(trial_type).unwrap_or("").trim().to_string(),
        });
    }
    Ok(events)
}

fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }

/// `(condition, rows)` for all four conditions, in `Condition::ALL` order.
/// Each row is `[onset, duration, weight = 1]`.
pub fn timing_files(events: &[Event], policy: OnsetPolicy) -> Vec<(Condition, Vec<[f64; 3]>)> {
    let mut events: Vec<Event> = events.iter().skip(1).cloned().collect();
    if let Some(first) = events.first().map(|e| e.onset) {
        match policy {
            OnsetPolicy::ZeroFirst => events[0].onset = 0.0,
            OnsetPolicy::Offset => for e in &mut events { e.onset = round2(e.onset - first) },
        }
    }
    Condition::ALL.iter()
        .map(|&condition| {
            let rows = events.iter()
                .filter(|e| e.trial_type == condition.trial_type())
                .map(|e| [e.onset, e.duration, 1.0])
                .collect();
            (condition, rows)
        })
        .collect()
}

/// `<base>/sub-<subject>/ses-<session>/func`
pub fn func_dir(base: &Path, entities: &Entities) -> PathBuf {
    base.join(format!("sub-{}", entities.subject))
        .join(format!("ses-{}", entities.session))
        .join("func")
}

pub fn events_path(base: &Path, entities: &Entities) -> PathBuf {
    func_dir(base, entities).join(format!("{}_events.tsv", entities.prefix()))
}

pub fn timing_path(base: &Path, entities: &Entities, condition: Condition) -> PathBuf {
    func_dir(base, entities).join(format!("{}_{}.tsv", entities.prefix(), condition.name()))
}

/// Write the four headerless timing files next to the run's `events.tsv`,
/// unless they all exist already. Returns their paths.
pub fn write_timing_files(base: &Path, entities: &Entities, policy: OnsetPolicy) -> Result<Vec<PathBuf>> {
    let paths: Vec<_> = Condition::ALL.iter().map(|&c| timing_path(base, entities, c)).collect();
    if paths.iter().all(|p| p.exists()) {
        log::info!("timing files for {entities} already exist");
        return Ok(paths);
    }

    let events_path = events_path(base, entities);
    if !events_path.exists() {
        return Err(Error::Io {
            path: events_path,
            source: std::io::ErrorKind::NotFound.into(),
        });
    }
    let events = read_events(&events_path)?;

    for ((_, rows), path) in timing_files(&events, policy).into_iter().zip(&paths) {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(path)?;
        for row in rows {
            writer.write_record(row.iter().map(|x| x.to_string()))?;
        }
        writer.flush().map_err(|source| Error::Io { path: path.clone(), source })?;
    }
    log::info!("created timing files for {entities}");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    const EVENTS: &str = "\
onset\tduration\ttrial_type\tresponse_time
0.5\t0\tdummy\tn/a
10.004\t1.0\tcorrect_go\t0.4
12.5\t1.0\tcorrect_stop\tn/a
15.0\t1.0\tincorrect_go\t0.6
18.25\t1.0\tcorrect_go\t0.3
";

    fn event(onset: f64, trial_type: &str) -> Event {
        Event { onset, duration: 1.0, trial_type: trial_type.into() }
    }

    #[test]
    fn offset_policy_shifts_and_rounds() {
        let events = [event(0.5, "dummy"), event(10.004, "correct_go"), event(12.5, "correct_stop"), event(18.257, "correct_go")];
        let files = timing_files(&events, OnsetPolicy::Offset);
        assert_eq!(files[0], (Condition::CorrGo, vec![[0.0, 1.0, 1.0], [8.25, 1.0, 1.0]]));
        assert_eq!(files[1], (Condition::IncorrGo, vec![]));
        assert_eq!(files[2], (Condition::CorrStop, vec![[2.5, 1.0, 1.0]]));
        assert_eq!(files[3], (Condition::IncorrStop, vec![]));
    }

    #[test]
    fn zero_first_policy_only_touches_first_onset() {
        let events = [event(0.5, "dummy"), event(10.0, "correct_go"), event(12.5, "correct_go")];
        let files = timing_files(&events, OnsetPolicy::ZeroFirst);
        assert_eq!(files[0].1, vec![[0.0, 1.0, 1.0], [12.5, 1.0, 1.0]]);
    }

    #[test]
    fn default_policy_zeroes_first_onset() {
        let events = [event(0.5, "dummy"), event(10.0, "correct_go"), event(12.5, "correct_stop")];
        assert_eq!(OnsetPolicy::default(), OnsetPolicy::ZeroFirst);
        let files = timing_files(&events, OnsetPolicy::default());
        assert_eq!(files[0].1, vec![[0.0, 1.0, 1.0]]);
        assert_eq!(files[2].1, vec![[12.5, 1.0, 1.0]]);
    }

    #[test]
    fn only_dummy_event() {
        let files = timing_files(&[event(1.0, "correct_go")], OnsetPolicy::Offset);
        assert!(files.iter().all(|(_, rows)| rows.is_empty()));
    }

    #[test]
    fn read_and_write_files() -> TestResult {
        let dir = tempdir()?;
        let entities = Entities::new("A", "base", "sst", 1);
        let events = events_path(dir.path(), &entities);
        std::fs::create_dir_all(events.parent().unwrap())?;
        std::fs::write(&events, EVENTS)?;

        let read = read_events(&events)?;
        assert_eq!(read.len(), 5);
        assert_eq!(read[2], Event { onset: 12.5, duration: 1.0, trial_type: "correct_stop".into() });

        let paths = write_timing_files(dir.path(), &entities, OnsetPolicy::Offset)?;
        assert!(paths[0].ends_with("sub-A/ses-base/func/sub-A_ses-base_task-sst_run-01_corrGo.tsv"));
        assert_eq!(std::fs::read_to_string(&paths[0])?, "0\t1\t1\n8.25\t1\t1\n");
        assert_eq!(std::fs::read_to_string(&paths[3])?, "");

        // Existing outputs are left alone
        std::fs::write(&events, "garbage")?;
        assert_eq!(write_timing_files(dir.path(), &entities, OnsetPolicy::Offset)?, paths);
        Ok(())
    }

    #[test]
    fn missing_column() -> TestResult {
        let dir = tempdir()?;
        let path = dir.path().join("events.tsv");
        std::fs::write(&path, "onset\tduration\n1\t2\n")?;
        assert!(matches!(read_events(&path), Err(Error::MissingColumn { column: "trial_type", .. })));
        Ok(())
    }

    #[test]
    fn missing_events_file() {
        let dir = tempdir().unwrap();
        let entities = Entities::new("A", "base", "sst", 1);
        assert!(matches!(write_timing_files(dir.path(), &entities, OnsetPolicy::Offset), Err(Error::Io { .. })));
    }
}
