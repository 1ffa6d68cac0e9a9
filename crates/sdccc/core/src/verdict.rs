//! Exit policy

use crate::observer::RunObserver;
use crate::storage::MessageStorage;
use std::path::Path;
use tracing::info;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Exit code for a finished run
///
/// An invalid run or an uncaught error always wins over a failure count.
pub fn exit_code(failures: u64, invalid: bool, had_error: bool) -> i32 {
    if had_error || invalid {
        EXIT_ERROR
    } else if failures > 0 {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

fn encoding_reason(count: u64, what: &str) -> String {
    format!(
        "During the Test run, {} messages with {} were encountered. For more detailed information \
         on these messages, please set SummarizeMessageEncodingErrors=false in the configuration.",
        count, what
    )
}

/// Turn the storage's encoding and MIME error counters into invalidation reasons
///
/// Only applies when errors are summarised; otherwise each message already
/// invalidated the run on its own.
pub fn summarize_encoding_errors(observer: &RunObserver, storage: &dyn MessageStorage, summarize: bool) {
    if !summarize {
        return;
    }
    let encoding_errors = storage.message_encoding_error_count();
    if encoding_errors > 0 {
        observer.invalidate(encoding_reason(encoding_errors, "invalid encoding declarations"));
    }
    let mime_errors = storage.invalid_mime_type_error_count();
    if mime_errors > 0 {
        observer.invalidate(encoding_reason(mime_errors, "invalid Mime Type declarations"));
    }
}

/// First verdict line, keyed on test failures only
///
/// Errors outside the tests show up in the validity line and the exit code.
pub fn outcome_line(failures: u64, total_tests_run: u64, run_dir: &Path) -> String {
    if failures == 0 {
        format!(
            "Test run with {} Tests was completed successfully. No problems were found.",
            total_tests_run
        )
    } else {
        format!(
            "Test run found problems. Please consult the logfiles in {} for further information.",
            run_dir.display()
        )
    }
}

/// Log the final verdict and return the exit code
pub fn print_verdict(observer: &RunObserver, failures: u64, had_error: bool, run_dir: &Path) -> i32 {
    let state = observer.snapshot();
    info!("{}", outcome_line(failures, state.total_tests_run, run_dir));
    if state.invalid {
        info!("Test run was invalid.");
    } else {
        info!("Test run was valid.");
    }
    exit_code(failures, state.invalid, had_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_grid() {
        assert_eq!(exit_code(0, false, false), EXIT_SUCCESS);
        assert_eq!(exit_code(0, true, false), EXIT_ERROR);
        assert_eq!(exit_code(3, false, false), EXIT_FAILURE);
        assert_eq!(exit_code(3, true, false), EXIT_ERROR);
        assert_eq!(exit_code(0, false, true), EXIT_ERROR);
        assert_eq!(exit_code(7, false, true), EXIT_ERROR);
    }

    #[test]
    fn test_outcome_line_ignores_errors_outside_tests() {
        let run_dir = Path::new("run");
        assert_eq!(
            outcome_line(0, 4, run_dir),
            "Test run with 4 Tests was completed successfully. No problems were found."
        );
        assert!(outcome_line(2, 4, run_dir).starts_with("Test run found problems."));
        assert!(outcome_line(2, 4, run_dir).contains("run"));
        // An aborted run still reports zero failures but exits with an error.
        assert!(outcome_line(0, 0, run_dir).contains("completed successfully"));
        assert_eq!(exit_code(0, false, true), EXIT_ERROR);
    }

    #[test]
    fn test_print_verdict_uses_observer_state() {
        let observer = RunObserver::new();
        observer.set_total_tests_run(4);
        assert_eq!(print_verdict(&observer, 0, false, Path::new("run")), EXIT_SUCCESS);
        assert_eq!(print_verdict(&observer, 2, false, Path::new("run")), EXIT_FAILURE);

        observer.invalidate("Could not connect to target device");
        assert_eq!(print_verdict(&observer, 0, false, Path::new("run")), EXIT_ERROR);
    }

    #[test]
    fn test_encoding_reason_wording() {
        assert_eq!(
            encoding_reason(5, "invalid encoding declarations"),
            "During the Test run, 5 messages with invalid encoding declarations were encountered. \
             For more detailed information on these messages, please set \
             SummarizeMessageEncodingErrors=false in the configuration."
        );
    }
}
