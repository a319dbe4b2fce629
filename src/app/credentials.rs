//! Credential loading for the CLI.
//!
//! Service accounts are read from a directory holding one bearer token per
//! `*.token` file; the file stem becomes the account label in logs. Per-user
//! tokens for `mtp:` links live in a separate directory, named by user id.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use drive_core::remote::AuthHint;
use drive_core::{Credential, CredentialPool};
use tracing::{debug, warn};

const TOKEN_EXTENSION: &str = "token";
const PRIMARY_LABEL: &str = "primary";

/// Loads service-account tokens from `dir`, sorted by file name.
pub(crate) fn load_service_accounts(dir: &Path) -> Result<Vec<Credential>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read service account directory '{}'", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list '{}'", dir.display()))?
            .path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(TOKEN_EXTENSION))
        {
            paths.push(path);
        }
    }
    paths.sort();

    let mut accounts = Vec::with_capacity(paths.len());
    for path in paths {
        let token = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read token file '{}'", path.display()))?;
        let token = token.trim();
        if token.is_empty() {
            warn!(path = %path.display(), "Skipping empty service account token");
            continue;
        }
        let label = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        accounts.push(Credential::new(label, token));
    }
    debug!(dir = %dir.display(), count = accounts.len(), "Loaded service accounts");
    Ok(accounts)
}

/// Resolves the primary credential for one run.
///
/// `mtp:` links use the requesting user's own token from
/// `<user_token_dir>/<user_id>.token`; everything else uses `--token`.
pub(crate) fn resolve_primary(
    token: Option<&str>,
    hint: AuthHint,
    user_token_dir: Option<&Path>,
    user_id: Option<&str>,
) -> Result<Option<Credential>> {
    if hint != AuthHint::UserToken {
        return Ok(token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Credential::new(PRIMARY_LABEL, t)));
    }

    let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
        bail!("Link asks for a user token but no user id was given (see --user-id)");
    };
    if user_id.contains(['/', '\\']) || user_id.starts_with('.') {
        bail!("Invalid user id '{user_id}'");
    }
    let Some(dir) = user_token_dir else {
        bail!("Link asks for a user token but no token directory was given (see --user-token-dir)");
    };
    let path = dir.join(format!("{user_id}.{TOKEN_EXTENSION}"));
    let token = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read user token '{}'", path.display()))?;
    let token = token.trim();
    if token.is_empty() {
        bail!("User token '{}' is empty", path.display());
    }
    debug!(user_id, "Loaded user token");
    Ok(Some(Credential::new(format!("user:{user_id}"), token)))
}

/// Builds the credential pool for one run.
///
/// The link prefix overrides `use_service_accounts`: `sa:` requires service
/// accounts, `tp:` and `mtp:` require a primary credential.
pub(crate) fn build_pool(
    primary: Option<Credential>,
    service_accounts: Vec<Credential>,
    hint: AuthHint,
    use_service_accounts: bool,
    max_rotations: Option<usize>,
) -> Result<CredentialPool> {
    let start_on_service = match hint {
        AuthHint::ServiceAccounts => {
            if service_accounts.is_empty() {
                bail!("Link asks for service accounts but none were loaded (see --service-account-dir)");
            }
            true
        }
        AuthHint::Primary | AuthHint::UserToken => {
            if primary.is_none() {
                bail!("Link asks for the primary token but none was given (see --token)");
            }
            false
        }
        AuthHint::Default => use_service_accounts && !service_accounts.is_empty(),
    };

    let mut pool = CredentialPool::new(primary, service_accounts).map_err(|_| {
        anyhow::anyhow!("No credentials available: pass --token or --service-account-dir")
    })?;
    if start_on_service {
        pool = pool.starting_with_service_accounts();
    }
    if let Some(max_rotations) = max_rotations {
        pool = pool.with_max_rotations(max_rotations);
    }
    Ok(pool)
}
