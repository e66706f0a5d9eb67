//! Trial definition files.
//!
//! One trial per line: `<start-arm> <goal-arm>`, whitespace separated and
//! case-insensitive. Blank lines and `#` comments are skipped. Tokens past
//! the second are ignored, so a result file parses back as its own trial list.
use plusmaze_traits::Arm;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialDefinition {
    pub start: Arm,
    pub goal: Arm,
}

pub fn parse_trials(text: &str) -> eyre::Result<Vec<TrialDefinition>> {
    let mut trials = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(start), Some(goal)) = (tokens.next(), tokens.next()) else {
            eyre::bail!("trial line {line_no}: expected '<start> <goal>', got '{line}'");
        };
        let start = start
            .parse::<Arm>()
            .map_err(|e| eyre::eyre!("trial line {line_no}: {e}"))?;
        let goal = goal
            .parse::<Arm>()
            .map_err(|e| eyre::eyre!("trial line {line_no}: {e}"))?;
        if start == goal {
            eyre::bail!("trial line {line_no}: start and goal are both {start}");
        }
        trials.push(TrialDefinition { start, goal });
    }
    Ok(trials)
}

pub fn load_trial_file(path: &Path) -> eyre::Result<Vec<TrialDefinition>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read trial file {:?}: {}", path, e))?;
    let trials = parse_trials(&text)?;
    if trials.is_empty() {
        eyre::bail!("trial file {:?} contains no trials", path);
    }
    Ok(trials)
}
