//! Process exit codes.

/// Exit codes for the imgmatch binary.
///
/// - 0: Completed normally, or the run was interrupted by the user. An
///   interrupt is a clean shutdown path: the fingerprint cache is saved with
///   whatever was computed up to that point.
/// - 1: Structural failure (corrupt cache, unreadable root path, pool
///   failure, failed cache save).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Completed normally or was cleanly interrupted.
    Success = 0,
    /// An unrecoverable error occurred.
    GeneralError = 1,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
    }
}
