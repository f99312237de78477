pub mod error;
pub mod guide;
pub mod platform;

use crate::adapter::Adapter;
use crate::platform::PlatformResult;

use self::error::{ApiError, ApiResult};
use super::auth::AppState;

/// Runs a blocking adapter call off the async runtime.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Adapter) -> PlatformResult<T> + Send + 'static,
    T: Send + 'static,
{
    let adapter = state.adapter.clone();
    tokio::task::spawn_blocking(move || f(&adapter))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}
