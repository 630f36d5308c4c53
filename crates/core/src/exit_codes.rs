//! Process exit codes shared by the caller binary and the job classifier.

/// Successful termination.
pub const EX_OK: i32 = 0;

/// Generic failure, also the retcode of a job that reported failure.
pub const EX_GENERIC: i32 = 1;

/// The command was used incorrectly, e.g. an unknown function name.
pub const EX_USAGE: i32 = 64;

/// Map a classified retcode to the process exit status.
///
/// With `passthrough` the retcode is used as-is; otherwise every nonzero
/// retcode collapses to [`EX_GENERIC`].
pub fn exit_status(retcode: i32, passthrough: bool) -> i32 {
    if passthrough {
        retcode
    } else if retcode != EX_OK {
        EX_GENERIC
    } else {
        EX_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_collapses_without_passthrough() {
        assert_eq!(exit_status(0, false), EX_OK);
        assert_eq!(exit_status(42, false), EX_GENERIC);
        assert_eq!(exit_status(-1, false), EX_GENERIC);
    }

    #[test]
    fn test_exit_status_passthrough() {
        assert_eq!(exit_status(42, true), 42);
        assert_eq!(exit_status(0, true), EX_OK);
    }

    #[test]
    fn test_usage_is_distinct_from_generic() {
        assert_ne!(EX_USAGE, EX_GENERIC);
        assert_ne!(EX_USAGE, EX_OK);
    }
}
