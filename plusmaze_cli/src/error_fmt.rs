//! Human-readable error descriptions and structured JSON error formatting.

use plusmaze_core::error::{BuildError, MazeError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPort => {
                "What happened: No register port was provided to the maze driver.\nLikely causes: The controller board failed to open or was not wired into the builder.\nHow to fix: Ensure the board is created successfully and passed via with_port(...).".to_string()
            }
            BuildError::MissingProfile => {
                "What happened: No device profile was provided to the maze driver.\nLikely causes: The config was not loaded or not converted into a DeviceProfile.\nHow to fix: Pass a profile via with_profile(...); the CLI builds it from --config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/plusmaze.toml for a sample."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MazeError>() {
        return match me {
            MazeError::Device(msg) => format!(
                "What happened: The maze controller did not respond ({msg}).\nLikely causes: USB cable unplugged, board not powered, or firmware not loaded.\nHow to fix: Check the cable and power, reload the board, then start a new session. Records were autosaved if a session was running."
            ),
            MazeError::PreconditionFailed { expected, detected } => format!(
                "What happened: The animal was detected in {detected}, not in the start arm {expected}.\nLikely causes: Animal placed in the wrong arm, or a stale detection.\nHow to fix: Put the animal in the {expected} arm and issue start again."
            ),
            MazeError::State(msg) => format!(
                "What happened: Command not allowed now ({msg}).\nLikely causes: Commands issued out of order.\nHow to fix: Follow start, open, finish for trials; start, pause, resume for training."
            ),
            MazeError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: The proximity id table or trial list does not match the rig.\nHow to fix: Edit the config or trial file, then rerun."
            ),
            MazeError::Io(msg) => format!(
                "What happened: Could not write records ({msg}).\nLikely causes: Output directory missing or not writable, or disk full.\nHow to fix: Choose a writable --output path; check autobackup.txt for saved records."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("gate calibration csv must have headers") {
        return "Invalid headers in gate calibration CSV. Expected 'arm,closed,open'.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: The device profile could not be loaded.\nLikely causes: Wrong --config path or a TOML syntax error.\nHow to fix: Check the path and the file contents. Original: {msg}"
        );
    }

    if lower.contains("trial line") || lower.contains("trial file") {
        return format!(
            "What happened: The trial file is invalid.\nLikely causes: A line that is not '<start> <goal>' with two different arm names.\nHow to fix: Fix the reported line and rerun. Original: {msg}"
        );
    }

    if lower.contains(" must ") || lower.contains("never maps") || lower.contains("reuses") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Duplicate trigger bits, out-of-range values, or an incomplete proximity table.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the error kind, used in JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<MazeError>() {
        Some(MazeError::Device(_)) => "Device",
        Some(MazeError::PreconditionFailed { .. }) => "PreconditionFailed",
        Some(MazeError::State(_)) => "State",
        Some(MazeError::Config(_)) => "Config",
        Some(MazeError::Io(_)) => "Io",
        None => "Error",
    }
}

/// Stable exit codes: 2 device, 3 precondition, 4 invalid state, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<MazeError>() {
        Some(MazeError::Device(_)) => 2,
        Some(MazeError::PreconditionFailed { .. }) => 3,
        Some(MazeError::State(_)) => 4,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let obj = match err.downcast_ref::<MazeError>() {
        Some(MazeError::PreconditionFailed { expected, detected }) => json!({
            "reason": reason_name(err),
            "details": { "expected": expected.to_string(), "detected": detected.to_string() },
            "message": msg,
        }),
        _ => json!({ "reason": reason_name(err), "message": msg }),
    };
    obj.to_string()
}
