//! Store access and password hashing run on the blocking pool so they never
//! stall the async workers.

use meshgate_common::{Error, Result};

pub async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {}", e)))?
}
