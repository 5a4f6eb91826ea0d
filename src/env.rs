//! Runtime environment detection.
//!
//! Provides a single source of truth for determining the runtime environment
//! (test or production) based on the `CHATLINK_ENV` environment variable.
//!
//! # Usage
//!
//! ```rust
//! use chatlink::env::is_any_test;
//!
//! if is_any_test() {
//!     // Use throwaway config directories, etc.
//! }
//! ```
//!
//! # Environment Variable
//!
//! Set `CHATLINK_ENV` to one of:
//! - `test` - Unit/integration test mode (config under the repo's `tmp/`)
//! - `system_test` - End-to-end tests against a real test server
//! - (anything else or unset) - Production mode

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Test environment.
    Test,
    /// System test environment, driven against a live test server.
    SystemTest,
}

impl Environment {
    /// Detect current environment from `CHATLINK_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("CHATLINK_ENV").ok().as_deref())
    }

    /// Map a raw `CHATLINK_ENV` value to an environment.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("system_test") => Self::SystemTest,
            _ => Self::Production,
        }
    }

    /// Returns `true` if running in any test mode (test or system_test).
    #[must_use]
    pub fn is_any_test(self) -> bool {
        matches!(self, Self::Test | Self::SystemTest)
    }
}

/// Returns `true` if running in any test mode (unit tests or system tests).
#[must_use]
pub fn is_any_test() -> bool {
    Environment::current().is_any_test()
}
