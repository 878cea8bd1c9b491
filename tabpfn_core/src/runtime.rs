//! Environment facts consumed by the telemetry service and the
//! interactive flows: is this CI, is this an interactive terminal.

use std::ffi::OsString;
use std::io::IsTerminal;

const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
];

/// Facts about the process's execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    /// Running under a CI system. Telemetry defaults to disabled here.
    pub ci: bool,
    /// Stdin and stdout are terminals, so prompting the user makes sense.
    pub interactive: bool,
}

impl Runtime {
    /// Detect the current runtime.
    pub fn detect() -> Runtime {
        Runtime {
            ci: ci_indicated(|name| std::env::var_os(name)),
            interactive: std::io::stdin().is_terminal() && std::io::stdout().is_terminal(),
        }
    }
}

fn ci_indicated(get: impl Fn(&str) -> Option<OsString>) -> bool {
    CI_ENV_VARS
        .iter()
        .any(|name| get(name).is_some_and(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ci_indicator_requires_non_empty_value() {
        assert!(ci_indicated(|name| (name == "CI").then(|| OsString::from("true"))));
        assert!(!ci_indicated(|name| (name == "CI").then(OsString::new)));
        assert!(!ci_indicated(|_| None));
    }

    #[test]
    fn any_known_indicator_counts() {
        assert!(ci_indicated(|name| {
            (name == "GITHUB_ACTIONS").then(|| OsString::from("true"))
        }));
        assert!(!ci_indicated(|name| {
            (name == "SOME_UNRELATED_VAR").then(|| OsString::from("1"))
        }));
    }
}
