use crate::error::{CatalogError, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race `fut` against the token. Dropping `fut` on cancellation is what aborts the I/O,
/// so anything it owns (HTTP requests, child processes spawned with `kill_on_drop`) goes with it.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(CatalogError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CatalogError::Cancelled),
        res = fut => res,
    }
}
