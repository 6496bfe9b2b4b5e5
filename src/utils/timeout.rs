use std::future::Future;
use std::time::Duration;

use crate::types::{AppError, Dependency, Result};

/// Await `fut`, failing with [`AppError::Timeout`] once `after` has elapsed.
///
/// Dropping the returned future drops `fut` with it, so an abandoned request
/// also abandons its in-flight call.
pub async fn bounded<T, F>(dependency: Dependency, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                dependency = %dependency,
                timeout_ms = after.as_millis() as u64,
                "External call timed out"
            );
            Err(AppError::Timeout { dependency, after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let value = bounded(Dependency::Store, Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = bounded::<(), _>(Dependency::Store, Duration::from_secs(1), async {
            Err(AppError::StoreUnavailable("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded(Dependency::Generation, Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late")
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Timeout {
                dependency: Dependency::Generation,
                ..
            }
        ));
    }
}
