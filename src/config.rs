//! Validation mode and per-handle configuration.
//!
//! Precondition checks are governed by an explicit [`ValidationMode`] carried
//! by every handle, so strict and permissive behaviour can be exercised in the
//! same binary. The default follows the build profile (see
//! [`ValidationMode::default`]).

use serde::Deserialize;

use crate::mpi_error::Result;

/// Tag used by [`Communicator::send_recv`](crate::topology::communicator::Communicator::send_recv)
/// when none is configured.
pub const DEFAULT_EXCHANGE_TAG: i32 = 1;

/// Whether caller-side precondition checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Precondition violations are raised as errors; a failed release in
    /// `Drop` panics.
    Strict,
    /// Precondition checks are skipped and the runtime decides; a failed
    /// release in `Drop` is logged.
    Permissive,
}

impl ValidationMode {
    /// `true` for [`ValidationMode::Strict`].
    #[inline]
    pub fn is_strict(self) -> bool {
        matches!(self, ValidationMode::Strict)
    }

    /// Run `check` in strict mode only; permissive mode always succeeds.
    #[inline]
    pub(crate) fn ensure<F>(self, check: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        match self {
            ValidationMode::Strict => check(),
            ValidationMode::Permissive => Ok(()),
        }
    }
}

impl Default for ValidationMode {
    /// `Strict` in debug builds or with the `strict-checks` feature,
    /// `Permissive` otherwise.
    fn default() -> Self {
        if cfg!(any(debug_assertions, feature = "strict-checks")) {
            ValidationMode::Strict
        } else {
            ValidationMode::Permissive
        }
    }
}

/// Configuration carried by every communicator and inherited by the
/// communicators derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Precondition checking policy.
    pub validation: ValidationMode,
    /// Tag used for both halves of the combined send-and-receive.
    pub exchange_tag: i32,
}

impl WrapperConfig {
    /// Default configuration with strict validation.
    pub fn strict() -> Self {
        Self {
            validation: ValidationMode::Strict,
            ..Default::default()
        }
    }

    /// Default configuration with permissive validation.
    pub fn permissive() -> Self {
        Self {
            validation: ValidationMode::Permissive,
            ..Default::default()
        }
    }
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            validation: ValidationMode::default(),
            exchange_tag: DEFAULT_EXCHANGE_TAG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpi_error::MpiWrapperError;

    #[test]
    fn default_mode_follows_build_profile() {
        let expected = if cfg!(any(debug_assertions, feature = "strict-checks")) {
            ValidationMode::Strict
        } else {
            ValidationMode::Permissive
        };
        assert_eq!(ValidationMode::default(), expected);
        assert_eq!(WrapperConfig::default().exchange_tag, DEFAULT_EXCHANGE_TAG);
    }

    #[test]
    fn permissive_skips_checks() {
        let failing = || Err(MpiWrapperError::NoCartesianTopology);
        assert!(ValidationMode::Permissive.ensure(failing).is_ok());
        assert_eq!(
            ValidationMode::Strict.ensure(failing),
            Err(MpiWrapperError::NoCartesianTopology)
        );
    }
}
