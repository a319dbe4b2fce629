//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Default chunk size in MiB.
pub const DEFAULT_CHUNK_SIZE_MIB: u64 = 100;

/// Download a cloud drive file or folder tree.
///
/// LINK may be a share link or a bare object id. Prefix it with `sa:` to use
/// service accounts, `tp:` to use the access token or `mtp:` to use the token
/// of the user given by --user-id.
#[derive(Parser, Debug, Clone)]
#[command(name = "drive-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Share link or object id
    pub link: String,

    /// Directory to download into (default: current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Local name for the downloaded file or top-level folder (default: remote name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// OAuth access token for the primary account
    #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account id of the requesting user; `mtp:` links use this user's token
    #[arg(long, env = "DRIVE_USER_ID")]
    pub user_id: Option<String>,

    /// Directory of per-user tokens (`<user id>.token`) for `mtp:` links
    #[arg(long)]
    pub user_token_dir: Option<PathBuf>,

    /// Directory of service-account tokens (one `*.token` file per account)
    #[arg(long)]
    pub service_account_dir: Option<PathBuf>,

    /// Start on service accounts instead of the primary token
    #[arg(long)]
    pub use_service_accounts: bool,

    /// Maximum service-account switches per run (default: number of accounts)
    #[arg(long)]
    pub max_rotations: Option<usize>,

    /// Skip files ending with these suffixes (comma separated, repeatable)
    #[arg(short = 'x', long = "exclude", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Chunk size in MiB (1-1024)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE_MIB, value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub chunk_size_mib: u64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Override the Drive API base URL
    #[arg(long, env = "DRIVE_API_BASE_URL", hide = true)]
    pub api_base_url: Option<String>,
}
