//! Shell detection.

/// The shell used to interpret command text when none is configured.
///
/// Commands run through `sh -c` on Unix and `cmd /C` on Windows; `$SHELL`
/// is not consulted.
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        "cmd".to_string()
    }

    #[cfg(not(windows))]
    {
        "sh".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shell_returns_non_empty() {
        assert!(!default_shell().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn default_shell_is_posix_sh() {
        assert_eq!(default_shell(), "sh");
    }
}
