//! Process-wide execution environment store.
//!
//! Holds the execution mode plus ad-hoc properties that several modules
//! of a server process need to agree on. Unlike the telemetry paths,
//! misuse here is a programmer error and fails loudly:
//! accessing the store before [`Environment::init`] returns
//! [`Error::EnvironmentUninitialized`], and re-initializing with a
//! conflicting mode returns [`Error::EnvironmentModeMismatch`].

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde_json::Value;

use tabpfn_core::{Error, Result};

/// Execution mode of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dev,
    Test,
    Prod,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Dev => "dev",
            Mode::Test => "test",
            Mode::Prod => "prod",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Inner {
    mode: Mode,
    properties: HashMap<String, Value>,
}

/// Store for the process's execution environment.
///
/// Most applications use the shared [`Environment::global`] instance;
/// separate instances exist so tests don't share state.
#[derive(Debug)]
pub struct Environment {
    inner: RwLock<Option<Inner>>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// Create an uninitialized environment store.
    pub const fn new() -> Environment {
        Environment {
            inner: RwLock::new(None),
        }
    }

    /// The process-wide shared instance.
    pub fn global() -> &'static Environment {
        static GLOBAL: Environment = Environment::new();
        &GLOBAL
    }

    /// Initialize (or re-initialize) the environment with `mode`.
    ///
    /// Re-initializing with the same mode replaces the instance and
    /// clears its properties. Re-initializing with a different mode is
    /// rejected: two parts of one process disagreeing on the mode is a
    /// bug.
    pub fn init(&self, mode: Mode) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .expect("thread holding environment lock should not panic");
        if let Some(inner) = &*guard {
            if inner.mode != mode {
                return Err(Error::EnvironmentModeMismatch {
                    current: inner.mode.to_string(),
                    requested: mode.to_string(),
                });
            }
        }
        *guard = Some(Inner {
            mode,
            properties: HashMap::new(),
        });
        log::info!(target: "tabpfn", "environment initialized with mode {mode}");
        Ok(())
    }

    /// Drop the environment entirely. Intended for tests.
    pub fn reset(&self) {
        let mut guard = self
            .inner
            .write()
            .expect("thread holding environment lock should not panic");
        *guard = None;
    }

    /// The initialized mode.
    pub fn mode(&self) -> Result<Mode> {
        let guard = self
            .inner
            .read()
            .expect("thread holding environment lock should not panic");
        guard
            .as_ref()
            .map(|inner| inner.mode)
            .ok_or(Error::EnvironmentUninitialized)
    }

    /// Add or overwrite a property.
    pub fn add_property(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .expect("thread holding environment lock should not panic");
        let inner = guard.as_mut().ok_or(Error::EnvironmentUninitialized)?;
        inner.properties.insert(key.into(), value.into());
        Ok(())
    }

    /// Look a property up.
    pub fn property(&self, key: &str) -> Result<Option<Value>> {
        let guard = self
            .inner
            .read()
            .expect("thread holding environment lock should not panic");
        let inner = guard.as_ref().ok_or(Error::EnvironmentUninitialized)?;
        Ok(inner.properties.get(key).cloned())
    }

    /// Snapshot of all properties.
    pub fn properties(&self) -> Result<HashMap<String, Value>> {
        let guard = self
            .inner
            .read()
            .expect("thread holding environment lock should not panic");
        let inner = guard.as_ref().ok_or(Error::EnvironmentUninitialized)?;
        Ok(inner.properties.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_access_is_a_loud_error() {
        let env = Environment::new();

        assert!(matches!(env.mode(), Err(Error::EnvironmentUninitialized)));
        assert!(matches!(
            env.property("a"),
            Err(Error::EnvironmentUninitialized)
        ));
        assert!(matches!(
            env.add_property("a", 1),
            Err(Error::EnvironmentUninitialized)
        ));
    }

    #[test]
    fn init_sets_mode_and_accepts_properties() {
        let env = Environment::new();
        env.init(Mode::Dev).unwrap();
        env.add_property("a", 1).unwrap();
        env.add_property("b", "two").unwrap();

        assert_eq!(env.mode().unwrap(), Mode::Dev);
        assert_eq!(env.property("a").unwrap(), Some(Value::from(1)));
        assert_eq!(env.property("b").unwrap(), Some(Value::from("two")));
        assert_eq!(env.property("missing").unwrap(), None);
        assert_eq!(env.properties().unwrap().len(), 2);
    }

    #[test]
    fn conflicting_mode_is_rejected() {
        let env = Environment::new();
        env.init(Mode::Dev).unwrap();

        let err = env.init(Mode::Prod).unwrap_err();
        assert!(matches!(err, Error::EnvironmentModeMismatch { .. }));
        // Original environment is untouched.
        assert_eq!(env.mode().unwrap(), Mode::Dev);
    }

    #[test]
    fn reinit_with_same_mode_clears_properties() {
        let env = Environment::new();
        env.init(Mode::Test).unwrap();
        env.add_property("a", 1).unwrap();

        env.init(Mode::Test).unwrap();
        assert_eq!(env.property("a").unwrap(), None);
    }

    #[test]
    fn reset_requires_reinitialization() {
        let env = Environment::new();
        env.init(Mode::Dev).unwrap();
        env.reset();

        assert!(matches!(env.mode(), Err(Error::EnvironmentUninitialized)));
    }
}
