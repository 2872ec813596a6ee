use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};

/// Speculative DNS prefetcher
///
/// Resolves hostnames ahead of need so that a later connection finds the
/// answer in the system resolver's cache, and learns which hosts a page's
/// subresources live on so they can be warmed up on the next visit.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Database to load learned referrals from and save them to.
    ///
    /// Overrides `persistence.state_path`. Empty string keeps referrals in
    /// memory only.
    #[arg(short, long)]
    pub statefile: Option<String>,

    /// Host of the page being visited. Its learned subresources are
    /// prefetched first, and measured navigations are attributed to it.
    #[arg(short, long)]
    pub referrer: Option<String>,

    /// After prefetching, look every host up again as a navigation would
    /// and account for the time the prefetch saved.
    #[arg(short, long)]
    pub navigate: bool,

    /// Seconds to wait for outstanding prefetches.
    #[arg(short, long, default_value_t = 10)]
    pub wait: u64,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Hostnames to prefetch.
    pub hosts: Vec<String>,
}

impl Cli {
    /// The referral database to use, if any. `configured` is the path from
    /// the config file.
    pub fn state_path(&self, configured: Option<&Path>) -> Option<PathBuf> {
        match self.statefile.as_deref() {
            Some("") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => configured.map(Path::to_path_buf),
        }
    }

    /// URL standing in for the page a navigation starts from.
    pub fn referrer_url(&self) -> String {
        self.referrer
            .as_deref()
            .map(|host| format!("http://{host}/"))
            .unwrap_or_default()
    }
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}
