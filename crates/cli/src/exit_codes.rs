//! CLI Exit Code Registry
//!
//! Single source of truth for `cgrade` exit codes. Grading scripts branch on
//! them, so treat them as part of the shell contract.
//!
//! | Code | Meaning                                          |
//! |------|--------------------------------------------------|
//! | 0    | Success / submission passed                      |
//! | 1    | Submission failed (verdict carries the reason)   |
//! | 2    | CLI usage error (bad args)                       |
//! | 3    | I/O or document parse error                      |
//! | 4    | Configuration error (TOML, unknown rule, limits) |

/// Success: command completed, or the submission passed.
pub const EXIT_SUCCESS: u8 = 0;

/// The submission was graded and failed. Like `diff(1)`, 1 means "differs".
pub const EXIT_FAILED: u8 = 1;

/// Usage error: bad arguments. clap exits with the same code on its own.
pub const EXIT_USAGE: u8 = 2;

/// A document or config file could not be read or parsed.
pub const EXIT_IO: u8 = 3;

/// The grading configuration is invalid.
pub const EXIT_CONFIG: u8 = 4;

use calcgrade_correction::CorrectionError;

/// Map a correction error to its exit code.
pub fn correction_exit_code(err: &CorrectionError) -> u8 {
    match err {
        CorrectionError::Config(_) | CorrectionError::UnknownRule(_) => EXIT_CONFIG,
        _ => EXIT_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_FAILED, EXIT_USAGE, EXIT_IO, EXIT_CONFIG];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_config_errors_map_to_config_code() {
        assert_eq!(correction_exit_code(&CorrectionError::Config("x".into())), EXIT_CONFIG);
        assert_eq!(correction_exit_code(&CorrectionError::UnknownRule("x".into())), EXIT_CONFIG);
        assert_eq!(correction_exit_code(&CorrectionError::Internal("x".into())), EXIT_FAILED);
    }
}
