//! Experiment records and their on-disk formats.
//!
//! Trial result line:
//!   `start goal result time startFrame openFrame closeFrame endFrame`
//! with time in seconds (3 decimals) and `-` for fields never captured.
//! Training result line: `from to turn time`.

use crate::error::{MazeError, Result};
use crate::types::{LickBuffer, Turn};
use eyre::WrapErr;
use plusmaze_config::TrialDefinition;
use plusmaze_traits::Arm;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const UNSET: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialRecord {
    pub start: Arm,
    pub goal: Arm,
    /// Arm the animal entered.
    pub result: Option<Arm>,
    pub elapsed: Option<Duration>,
    pub start_frame: Option<u32>,
    pub open_frame: Option<u32>,
    pub close_frame: Option<u32>,
    pub end_frame: Option<u32>,
}

impl From<TrialDefinition> for TrialRecord {
    fn from(t: TrialDefinition) -> Self {
        Self::new(t.start, t.goal)
    }
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| UNSET.to_string(), |v| v.to_string())
}

fn parse_opt<T: std::str::FromStr>(tok: &str, field: &str) -> eyre::Result<Option<T>> {
    if tok == UNSET {
        return Ok(None);
    }
    tok.parse::<T>()
        .map(Some)
        .map_err(|_| eyre::eyre!("invalid {field} '{tok}'"))
}

impl TrialRecord {
    pub fn new(start: Arm, goal: Arm) -> Self {
        Self {
            start,
            goal,
            result: None,
            elapsed: None,
            start_frame: None,
            open_frame: None,
            close_frame: None,
            end_frame: None,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.result == Some(self.goal)
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some() && self.elapsed.is_some()
    }

    pub fn to_line(&self) -> String {
        let time = self
            .elapsed
            .map_or_else(|| UNSET.to_string(), |d| format!("{:.3}", d.as_secs_f64()));
        format!(
            "{} {} {} {} {} {} {} {}",
            self.start,
            self.goal,
            opt(self.result),
            time,
            opt(self.start_frame),
            opt(self.open_frame),
            opt(self.close_frame),
            opt(self.end_frame),
        )
    }

    pub fn parse_line(line: &str) -> eyre::Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [start, goal, result, time, sf, of, cf, ef] = tokens.as_slice() else {
            eyre::bail!("expected 8 fields in result line, got {}", tokens.len());
        };
        let elapsed = parse_opt::<f64>(time, "time")?
            .map(|s| {
                if s.is_finite() && s >= 0.0 {
                    // written with millisecond resolution
                    Ok(Duration::from_millis((s * 1000.0).round() as u64))
                } else {
                    Err(eyre::eyre!("invalid time '{time}'"))
                }
            })
            .transpose()?;
        Ok(Self {
            start: start.parse()?,
            goal: goal.parse()?,
            result: parse_opt(result, "result")?,
            elapsed,
            start_frame: parse_opt(sf, "start frame")?,
            open_frame: parse_opt(of, "open frame")?,
            close_frame: parse_opt(cf, "close frame")?,
            end_frame: parse_opt(ef, "end frame")?,
        })
    }
}

/// `<stem>-lick<ext>` next to the result file.
pub fn lick_path(result_path: &Path) -> PathBuf {
    let stem = result_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match result_path.extension() {
        Some(ext) => format!("{stem}-lick.{}", ext.to_string_lossy()),
        None => format!("{stem}-lick"),
    };
    result_path.with_file_name(name)
}

fn write_lines(path: &Path, lines: impl IntoIterator<Item = String>) -> Result<()> {
    let io =
        |e: std::io::Error| eyre::Report::new(MazeError::Io(format!("{}: {e}", path.display())));
    let mut w = BufWriter::new(File::create(path).map_err(io)?);
    for line in lines {
        writeln!(w, "{line}").map_err(io)?;
    }
    w.flush().map_err(io)?;
    Ok(())
}

/// Trial records of one session, by trial index.
#[derive(Debug, Clone, Default)]
pub struct ExperimentLog {
    records: Vec<TrialRecord>,
    completed: usize,
    correct: usize,
}

impl ExperimentLog {
    pub fn new(trials: &[TrialDefinition]) -> Self {
        Self {
            records: trials.iter().copied().map(TrialRecord::from).collect(),
            completed: 0,
            correct: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrialRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    /// Store a finished trial at `index` and update the running score.
    pub fn replace_at(&mut self, index: usize, record: TrialRecord) -> Result<()> {
        let len = self.records.len();
        let slot = self.records.get_mut(index).ok_or_else(|| {
            eyre::Report::new(MazeError::State(format!(
                "trial index {index} out of range ({len} trials)"
            )))
        })?;
        *slot = record;
        self.completed += 1;
        if record.is_correct() {
            self.correct += 1;
        }
        Ok(())
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Fraction correct among completed trials; `None` before the first.
    pub fn accuracy(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.correct as f64 / self.completed as f64)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_lines(path, self.records.iter().map(TrialRecord::to_line))
            .wrap_err("write trial results")?;
        tracing::info!(path = %path.display(), trials = self.records.len(), "results written");
        Ok(())
    }

    /// One `1`/`0` line per recorded frame.
    pub fn save_licks(path: &Path, licks: &LickBuffer, frame_count: u32) -> Result<()> {
        let recorded = licks.recorded(frame_count);
        if usize::try_from(frame_count).is_ok_and(|n| n > recorded.len()) {
            tracing::warn!(
                frame_count,
                buffer = licks.len(),
                "more frames than lick buffer slots; lick file truncated"
            );
        }
        write_lines(
            path,
            recorded.iter().map(|l| String::from(if *l { "1" } else { "0" })),
        )
        .wrap_err("write lick file")?;
        tracing::info!(path = %path.display(), frames = recorded.len(), "lick file written");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingRecord {
    pub from: Arm,
    pub to: Arm,
    pub turn: Turn,
    pub elapsed: Duration,
}

impl TrainingRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {:.3}",
            self.from,
            self.to,
            self.turn,
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingStats {
    /// 1-based index of the trial in progress.
    pub trial_index: usize,
    pub left: usize,
    pub right: usize,
    pub total: usize,
}

impl TrainingStats {
    pub fn record(&mut self, turn: Turn) {
        match turn {
            Turn::Left => self.left += 1,
            Turn::Right => self.right += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingLog {
    records: Vec<TrainingRecord>,
    stats: TrainingStats,
}

impl TrainingLog {
    pub fn push(&mut self, record: TrainingRecord) {
        self.stats.record(record.turn);
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrainingRecord] {
        &self.records
    }

    pub fn stats(&self) -> TrainingStats {
        self.stats
    }

    pub(crate) fn set_trial_index(&mut self, index: usize) {
        self.stats.trial_index = index;
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_lines(path, self.records.iter().map(TrainingRecord::to_line))
            .wrap_err("write training results")?;
        tracing::info!(
            path = %path.display(),
            trials = self.records.len(),
            "training results written"
        );
        Ok(())
    }
}

/// Human summary of a session score, e.g. `3/4 (75%)`.
pub fn score_line(correct: usize, completed: usize) -> String {
    let mut s = format!("{correct}/{completed}");
    if completed > 0 {
        let _ = write!(s, " ({:.0}%)", 100.0 * correct as f64 / completed as f64);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use plusmaze_config::parse_trials;
    use tempfile::tempdir;

    fn finished() -> TrialRecord {
        TrialRecord {
            start: Arm::West,
            goal: Arm::North,
            result: Some(Arm::North),
            elapsed: Some(Duration::from_millis(12_345)),
            start_frame: Some(0),
            open_frame: Some(3),
            close_frame: Some(40),
            end_frame: Some(80),
        }
    }

    #[test]
    fn result_line_format() {
        assert_eq!(finished().to_line(), "west north north 12.345 0 3 40 80");
        assert_eq!(
            TrialRecord::new(Arm::South, Arm::East).to_line(),
            "south east - - - - - -"
        );
    }

    #[test]
    fn result_line_reparses_as_trial_definition() {
        let rec = finished();
        let defs = parse_trials(&rec.to_line()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!((defs[0].start, defs[0].goal), (rec.start, rec.goal));
        assert_eq!(TrialRecord::parse_line(&rec.to_line()).unwrap(), rec);
    }

    #[test]
    fn parse_line_rejects_short_lines() {
        assert!(TrialRecord::parse_line("west north north").is_err());
        assert!(TrialRecord::parse_line("west north north x 0 0 0 0").is_err());
    }

    #[test]
    fn accuracy_counts_completed_only() {
        let defs = parse_trials("west north\nsouth east\nnorth west\n").unwrap();
        let mut log = ExperimentLog::new(&defs);
        assert_eq!(log.accuracy(), None);
        log.replace_at(0, finished()).unwrap();
        let mut wrong = TrialRecord::new(Arm::South, Arm::East);
        wrong.result = Some(Arm::West);
        wrong.elapsed = Some(Duration::from_secs(3));
        log.replace_at(1, wrong).unwrap();
        assert_eq!(log.correct(), 1);
        assert_eq!(log.completed(), 2);
        assert_eq!(log.accuracy(), Some(0.5));
        assert_eq!(score_line(1, 2), "1/2 (50%)");
    }

    #[test]
    fn replace_past_the_end_is_a_state_error() {
        let defs = parse_trials("west north\nsouth east\nnorth west\n").unwrap();
        let mut log = ExperimentLog::new(&defs);
        let err = log.replace_at(3, finished()).unwrap_err();
        match err.downcast_ref::<MazeError>() {
            Some(MazeError::State(msg)) => assert!(msg.contains("(3 trials)")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(log.completed(), 0);
    }

    #[test]
    fn lick_path_inserts_suffix_before_extension() {
        assert_eq!(
            lick_path(Path::new("/data/mouse1.txt")),
            PathBuf::from("/data/mouse1-lick.txt")
        );
        assert_eq!(lick_path(Path::new("out")), PathBuf::from("out-lick"));
    }

    #[test]
    fn lick_file_clips_to_frame_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r-lick.txt");
        let licks = LickBuffer::from_bytes(&[0b0000_0110]);
        ExperimentLog::save_licks(&path, &licks, 4).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\n1\n1\n0\n");
        ExperimentLog::save_licks(&path, &licks, 100).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 8);
    }

    #[test]
    fn training_line_format() {
        let r = TrainingRecord {
            from: Arm::West,
            to: Arm::North,
            turn: Turn::Right,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(r.to_line(), "west north right 1.500");
    }
}
