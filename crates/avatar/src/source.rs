use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

/// Resolve one avatar source into raw bytes: `http(s)://` URLs are fetched
/// with `reqwest`, anything else is read as a path relative to
/// `source_root`. Failures are logged and returned as `Err` — the caller
/// (`GroupAvatarComposer::compose`) decides whether a failed source becomes
/// a placeholder tile or aborts the whole composition.
pub async fn resolve(client: &reqwest::Client, source_root: &str, source: &str) -> Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = client
            .get(source)
            .send()
            .await
            .map_err(|e| Error::external(format!("fetching avatar source {source}"), e))?;
        let response = response
            .error_for_status()
            .map_err(|e| Error::external(format!("avatar source {source} returned error status"), e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::external(format!("reading avatar source {source} body"), e))?;
        Ok(bytes.to_vec())
    } else {
        let path = Path::new(source_root).join(source);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::external(format!("reading local avatar source {}", path.display()), e))
    }
}

/// Best-effort variant: logs and returns `None` on failure instead of
/// propagating, so one bad source degrades to a placeholder tile rather
/// than failing the whole grid ("gray placeholders for
/// missing/failed input").
pub async fn resolve_lenient(client: &reqwest::Client, source_root: &str, source: &str) -> Option<Vec<u8>> {
    match resolve(client, source_root, source).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(source, %err, "avatar source unavailable, using placeholder");
            None
        },
    }
}
