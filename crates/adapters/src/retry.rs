use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::AdapterError;

/// Bounded retry policy. `max_attempts` counts the first call; the default
/// is three back-to-back attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub sleep: Duration,
}

impl RetryConfig {
    pub const fn new(max_attempts: usize, sleep: Duration) -> Self {
        Self {
            max_attempts,
            sleep,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            sleep: Duration::ZERO,
        }
    }
}

/// Calls `f` until it succeeds, fails with a non-retryable error, or the
/// attempt bound is reached. The last error is wrapped in
/// [`AdapterError::RetryExhausted`].
pub fn call_with_retry<F, T>(mut f: F, config: &RetryConfig) -> Result<T, AdapterError>
where
    F: FnMut() -> Result<T, AdapterError>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error: Option<AdapterError> = None;

    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!("Attempt {attempt}/{attempts} failed: {err}");
                if attempt < attempts && !config.sleep.is_zero() {
                    thread::sleep(config.sleep);
                }
                last_error = Some(err);
            }
        }
    }

    let err = last_error.unwrap_or(AdapterError::EmptyResponse);
    Err(AdapterError::retry_exhausted(attempts, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_success_makes_one_call() {
        let calls = Cell::new(0);
        let value = call_with_retry(
            || {
                calls.set(calls.get() + 1);
                Ok::<_, AdapterError>(7)
            },
            &RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn gives_up_after_three_attempts_with_the_last_cause() {
        let calls = Cell::new(0);
        let err = call_with_retry(
            || -> Result<(), AdapterError> {
                calls.set(calls.get() + 1);
                Err(AdapterError::EmptyResponse)
            },
            &RetryConfig::default(),
        )
        .unwrap_err();
        assert_eq!(calls.get(), 3);
        match err {
            AdapterError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AdapterError::EmptyResponse));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn recovers_on_a_later_attempt() {
        let calls = Cell::new(0);
        let value = call_with_retry(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(AdapterError::EmptyResponse)
                } else {
                    Ok("done")
                }
            },
            &RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn configuration_errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = call_with_retry(
            || -> Result<(), AdapterError> {
                calls.set(calls.get() + 1);
                Err(AdapterError::MissingApiKey("OPENAI_API_KEY"))
            },
            &RetryConfig::default(),
        )
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, AdapterError::MissingApiKey(_)));
    }
}
