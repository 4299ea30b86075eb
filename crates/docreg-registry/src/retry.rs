//! Single retry for upstream lookups.

use std::{future::Future, time::Duration};

use docreg_core::resolver::ResolveError;
use rand_core::{OsRng, RngCore as _};

/// Upper bound of the pause before the second attempt.
pub const MAX_JITTER: Duration = Duration::from_millis(250);

/// Run `op`; if it fails with a retryable error, wait a random pause of at
/// most [`MAX_JITTER`] and run it exactly once more.
pub async fn once<T, F, Fut>(mut op: F) -> Result<T, ResolveError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ResolveError>>,
{
  match op().await {
    Err(e) if e.is_retryable() => {
      let pause = jitter();
      tracing::warn!(error = %e, ?pause, "upstream lookup failed, retrying once");
      tokio::time::sleep(pause).await;
      op().await
    }
    other => other,
  }
}

fn jitter() -> Duration {
  let max = MAX_JITTER.as_millis() as u32;
  Duration::from_millis(u64::from(OsRng.next_u32() % (max + 1)))
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  #[tokio::test]
  async fn timeout_is_retried_once() {
    let calls = &AtomicU32::new(0);
    let result = once(|| async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(ResolveError::Timeout("https://ext/dt/1".into()))
    })
    .await;
    assert!(matches!(result, Err(ResolveError::Timeout(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn second_attempt_can_succeed() {
    let calls = &AtomicU32::new(0);
    let result = once(|| async move {
      if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(ResolveError::Timeout("https://ext/dt/1".into()))
      } else {
        Ok(7)
      }
    })
    .await;
    assert_eq!(result.unwrap(), 7);
  }

  #[tokio::test]
  async fn other_failures_are_not_retried() {
    let calls = &AtomicU32::new(0);
    let result = once(|| async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(ResolveError::InvalidResource {
        url:    "https://ext/dt/1".into(),
        reason: "not a document type".into(),
      })
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn jitter_is_bounded() {
    for _ in 0..100 {
      assert!(jitter() <= MAX_JITTER);
    }
  }
}
