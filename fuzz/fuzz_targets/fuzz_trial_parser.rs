#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(trials) = plusmaze_config::parse_trials(data) {
        // Every accepted trial has distinct arms.
        assert!(trials.iter().all(|t| t.start != t.goal));
    }
});
