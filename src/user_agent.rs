//! User-Agent string for Drive API traffic.

const PROJECT_UA_URL: &str = "https://github.com/fierce/drive-downloader";

/// Default User-Agent for all Drive requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("drive-downloader/{version} (+{PROJECT_UA_URL})")
}
