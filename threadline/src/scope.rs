use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Run `fut` unless the scope is cancelled first.
///
/// Returns None when the scope was cancelled before or while `fut` ran, so
/// the caller drops the result instead of applying it to a torn-down view.
pub async fn until_cancelled<F: Future>(scope: &CancellationToken, fut: F) -> Option<F::Output> {
    if scope.is_cancelled() {
        return None;
    }
    tokio::select! {
        _ = scope.cancelled() => None,
        output = fut => {
            if scope.is_cancelled() {
                None
            } else {
                Some(output)
            }
        }
    }
}
