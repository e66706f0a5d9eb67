//! Rig assembly and session execution for each subcommand.

use crossbeam_channel::{Receiver, bounded};
use eyre::WrapErr;
use plusmaze_config::{Config, load_trial_file};
use plusmaze_core::error::Result as CoreResult;
use plusmaze_core::log::score_line;
use plusmaze_core::{
    AutoReward, ContinuousTrainingSequencer, DeviceProfile, DoseTarget, MazeDriver, MazeMonitor,
    OperatorCommand, RotationCommand, RunOutcome, TrainingConfig, TrialSequencer, Turn, drive,
};
use plusmaze_hardware::{SimScope, SimulatedMaze};
use plusmaze_traits::Arm;
use serde_json::{Value, json};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Comma-separated detector readings for the simulated board (ids or arm names).
pub const SIM_POSITIONS_ENV: &str = "PLUSMAZE_SIM_POSITIONS";
/// Any value makes the simulated board refuse every transfer.
pub const SIM_DISCONNECTED_ENV: &str = "PLUSMAZE_SIM_DISCONNECTED";

const BACKUP_FILE: &str = "autobackup.txt";

/// What a command did, for the console and for `--json`.
pub struct Summary {
    pub human: String,
    pub json: Value,
}

pub fn outcome_name(o: RunOutcome) -> &'static str {
    match o {
        RunOutcome::Finished => "finished",
        RunOutcome::Stopped => "stopped",
        RunOutcome::Interrupted => "interrupted",
    }
}

/// Translate `PLUSMAZE_SIM_POSITIONS` into raw detector ids using the profile's id table.
pub fn parse_sim_positions(spec: &str, cfg: &Config) -> eyre::Result<Vec<u32>> {
    spec.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|tok| {
            if let Ok(id) = tok.parse::<u32>() {
                return Ok(id);
            }
            let arm = tok
                .parse::<Arm>()
                .map_err(|e| eyre::eyre!("{SIM_POSITIONS_ENV}: {e}"))?;
            cfg.proximity
                .ids
                .iter()
                .position(|a| *a == arm)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| eyre::eyre!("{SIM_POSITIONS_ENV}: no detector id maps to {arm}"))
        })
        .collect()
}

/// Simulated board wired like the profile describes.
fn simulated_board(cfg: &Config) -> eyre::Result<SimulatedMaze> {
    let sim = SimulatedMaze::new();
    sim.attach_scope(SimScope {
        trigger_channel: cfg.scope.trigger_channel,
        start_bit: cfg.scope.start_bit,
        stop_bit: cfg.scope.stop_bit,
        reset_bit: cfg.scope.reset_bit,
        frame_lo_addr: cfg.scope.frame_lo_addr,
        frame_hi_addr: cfg.scope.frame_hi_addr,
        frames_per_read: 1,
    });
    if let Ok(spec) = std::env::var(SIM_POSITIONS_ENV) {
        let ids = parse_sim_positions(&spec, cfg)?;
        tracing::debug!(?ids, "scripted detector readings");
        sim.script_reads(cfg.proximity.addr, ids);
    }
    if std::env::var_os(SIM_DISCONNECTED_ENV).is_some() {
        sim.disconnect();
    }
    Ok(sim)
}

pub fn build_driver(cfg: &Config) -> eyre::Result<MazeDriver> {
    let sim = simulated_board(cfg)?;
    tracing::info!(backend = "sim", "opening maze controller");
    MazeDriver::builder()
        .with_port(sim)
        .with_profile(DeviceProfile::from(cfg))
        .build()
}

/// Read operator words from stdin on a separate thread. The thread never
/// touches the driver; it ends at EOF.
pub fn operator_commands() -> eyre::Result<Receiver<OperatorCommand>> {
    let (tx, rx) = bounded(16);
    std::thread::Builder::new()
        .name("operator".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<OperatorCommand>() {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "ignored operator input"),
                }
            }
            tracing::debug!("operator input closed");
        })
        .wrap_err("spawn operator reader")?;
    Ok(rx)
}

fn backup_path(output: &Path) -> PathBuf {
    output.with_file_name(BACKUP_FILE)
}

pub fn run_trials(
    cfg: &Config,
    file: &Path,
    output: &Path,
    block: Arm,
    auto: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<Summary> {
    let trials = load_trial_file(file)?;
    let driver = build_driver(cfg)?;
    let clock = driver.clock();
    let mut seq = TrialSequencer::new(driver, &trials, block)?;
    seq.begin()?;

    let commands = operator_commands()?;
    if !auto {
        eprintln!("commands: start | open | rewind | finish | stop");
    }
    let outcome = match drive(&mut seq, &*clock, &commands, shutdown, auto) {
        Ok(o) => o,
        Err(e) => {
            let backup = backup_path(output);
            if let Err(save) = seq.autosave(&backup) {
                tracing::error!(error = %save, "autosave failed");
            }
            return Err(e);
        }
    };

    let written = if outcome == RunOutcome::Interrupted {
        let backup = backup_path(output);
        seq.autosave(&backup)?;
        tracing::warn!(path = %backup.display(), "session interrupted; records autosaved");
        backup
    } else {
        seq.persist(output)?;
        output.to_path_buf()
    };

    let log = seq.log();
    let score = score_line(log.correct(), log.completed());
    // Pass this back as --block on the next run.
    let block = seq.block_position();
    Ok(Summary {
        human: format!(
            "{}: {score} correct; block faces {block}; results in {}",
            outcome_name(outcome),
            written.display()
        ),
        json: json!({
            "command": "trials",
            "outcome": outcome_name(outcome),
            "trials": log.len(),
            "completed": log.completed(),
            "correct": log.correct(),
            "accuracy": log.accuracy(),
            "block": block.to_string(),
            "output": written.display().to_string(),
        }),
    })
}

pub fn run_training(
    cfg: &Config,
    turn: Turn,
    trials: usize,
    from: Arm,
    output: &Path,
    auto: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<Summary> {
    let driver = build_driver(cfg)?;
    let clock = driver.clock();
    let mut seq = ContinuousTrainingSequencer::new(
        driver,
        TrainingConfig {
            target: turn,
            trials,
        },
        from,
    )?;

    let commands = operator_commands()?;
    if !auto {
        eprintln!("commands: start | pause | resume | stop");
    }
    let result = drive(&mut seq, &*clock, &commands, shutdown, auto);
    let written = match &result {
        Ok(RunOutcome::Finished | RunOutcome::Stopped) => output.to_path_buf(),
        _ => backup_path(output),
    };
    seq.persist(&written)?;
    let outcome = result?;

    let stats = seq.stats();
    Ok(Summary {
        human: format!(
            "{}: {} trials, {} left, {} right; results in {}",
            outcome_name(outcome),
            stats.total,
            stats.left,
            stats.right,
            written.display()
        ),
        json: json!({
            "command": "train",
            "outcome": outcome_name(outcome),
            "target": turn.to_string(),
            "total": stats.total,
            "left": stats.left,
            "right": stats.right,
            "output": written.display().to_string(),
        }),
    })
}

pub fn run_monitor(
    cfg: &Config,
    reward: AutoReward,
    maintain_t_maze: bool,
    duration: Option<Duration>,
    shutdown: &AtomicBool,
) -> eyre::Result<Summary> {
    let driver = build_driver(cfg)?;
    let clock = driver.clock();
    let mut mon = MazeMonitor::new(driver, reward, maintain_t_maze)?;
    if let Some(d) = duration {
        mon = mon.with_duration(d);
    }
    let commands = operator_commands()?;
    let outcome = drive(&mut mon, &*clock, &commands, shutdown, false)?;
    Ok(Summary {
        human: format!("{}: animal last seen in {}", outcome_name(outcome), mon.position()),
        json: json!({
            "command": "monitor",
            "outcome": outcome_name(outcome),
            "position": mon.position().to_string(),
        }),
    })
}

pub fn run_gate(cfg: &Config, arm: Arm, closed: bool) -> eyre::Result<Summary> {
    let mut driver = build_driver(cfg)?;
    driver.actuate_gate(arm, closed)?;
    let state = if closed { "closed" } else { "open" };
    Ok(Summary {
        human: format!("{arm} gate {state}"),
        json: json!({ "command": "gate", "arm": arm.to_string(), "state": state }),
    })
}

pub fn run_dose(cfg: &Config, target: DoseTarget) -> eyre::Result<Summary> {
    let mut driver = build_driver(cfg)?;
    driver.dose(target)?;
    Ok(Summary {
        human: format!("dosed {target}"),
        json: json!({ "command": "dose", "target": target.to_string() }),
    })
}

pub fn run_rotate(cfg: &Config, cmd: RotationCommand) -> eyre::Result<Summary> {
    let mut driver = build_driver(cfg)?;
    driver.rotate(cmd)?;
    // Let the block finish turning before the process exits.
    driver.settle(driver.profile().timing.rotation_settle);
    Ok(Summary {
        human: format!("rotated {cmd}"),
        json: json!({
            "command": "rotate",
            "rotation": cmd.to_string(),
            "wired": cmd.is_implemented(),
        }),
    })
}

fn probe(driver: &mut MazeDriver) -> CoreResult<(Arm, u32, bool)> {
    Ok((
        driver.last_detected_arm()?,
        driver.frame_count()?,
        driver.lick_state()?,
    ))
}

pub fn run_self_check(cfg: &Config) -> eyre::Result<Summary> {
    let mut driver = build_driver(cfg)?;
    let (position, frames, licking) = probe(&mut driver).wrap_err("self-check")?;
    Ok(Summary {
        human: format!("self-check ok: animal in {position}, frame count {frames}, lick {licking}"),
        json: json!({
            "command": "self-check",
            "status": "ok",
            "position": position.to_string(),
            "frames": frames,
            "lick": licking,
        }),
    })
}
