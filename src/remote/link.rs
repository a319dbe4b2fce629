//! Share-link parsing.
//!
//! Accepts the usual drive link shapes and bare object ids:
//!
//! - `https://drive.google.com/file/d/<id>/view`
//! - `https://drive.google.com/drive/u/0/folders/<id>`
//! - `https://docs.google.com/document/d/<id>/edit`
//! - `https://drive.google.com/open?id=<id>` / `uc?id=<id>`
//! - `<id>`
//!
//! A leading `sa:` asks for service accounts, `tp:` for the primary
//! credential and `mtp:` for the requesting user's own token.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

#[allow(clippy::expect_used)]
static PATH_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:folders|d)/([-\w]{10,})").expect("path id regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static BARE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-\w]{10,}$").expect("bare id regex is valid") // Static pattern, safe to panic
});

/// Errors from [`parse_link`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("empty link")]
    Empty,
    #[error("drive ID not found in link: {link}")]
    IdNotFound { link: String },
}

/// Credential preference encoded in the link prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthHint {
    /// No prefix; use the configured default.
    #[default]
    Default,
    /// `sa:` prefix.
    ServiceAccounts,
    /// `tp:` prefix.
    Primary,
    /// `mtp:` prefix.
    UserToken,
}

/// A parsed share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    pub object_id: String,
    pub auth_hint: AuthHint,
}

/// Parses a share link or bare id.
///
/// # Errors
///
/// Returns [`LinkError`] when no object id can be found.
pub fn parse_link(link: &str) -> Result<ParsedLink, LinkError> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(LinkError::Empty);
    }

    let (auth_hint, rest) = if let Some(rest) = trimmed.strip_prefix("sa:") {
        (AuthHint::ServiceAccounts, rest)
    } else if let Some(rest) = trimmed.strip_prefix("mtp:") {
        (AuthHint::UserToken, rest)
    } else if let Some(rest) = trimmed.strip_prefix("tp:") {
        (AuthHint::Primary, rest)
    } else {
        (AuthHint::Default, trimmed)
    };

    let object_id = extract_object_id(rest)?;
    Ok(ParsedLink {
        object_id,
        auth_hint,
    })
}

/// Extracts the object id from a link without prefix handling.
///
/// # Errors
///
/// Returns [`LinkError::IdNotFound`] when the link has no recognizable id.
pub fn extract_object_id(link: &str) -> Result<String, LinkError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(LinkError::Empty);
    }
    if BARE_ID_PATTERN.is_match(link) {
        return Ok(link.to_string());
    }
    if let Some(captures) = PATH_ID_PATTERN.captures(link)
        && let Some(id) = captures.get(1)
    {
        return Ok(id.as_str().to_string());
    }
    Url::parse(link)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "id")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LinkError::IdNotFound {
            link: link.to_string(),
        })
}
