#![forbid(unsafe_code)]

use std::io;
use std::net::ToSocketAddrs;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The name does not exist. An ordinary outcome of prefetching.
    #[error("host not found")]
    NotFound,

    /// The lookup itself failed.
    #[error("lookup failed: {0}")]
    Lookup(#[from] io::Error),
}

/// Blocking name resolution, run on a worker thread outside the scheduler
/// lock.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, hostname: &str) -> Result<(), ResolveError>;
}

impl<F> HostResolver for F
where
    F: Fn(&str) -> Result<(), ResolveError> + Send + Sync,
{
    fn resolve(&self, hostname: &str) -> Result<(), ResolveError> {
        self(hostname)
    }
}

/// Resolves through the platform resolver, which is what warms the OS cache.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    port: u16,
}

impl SystemResolver {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(80)
    }
}

impl HostResolver for SystemResolver {
    fn resolve(&self, hostname: &str) -> Result<(), ResolveError> {
        match (hostname, self.port).to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(_) => Ok(()),
                None => Err(ResolveError::NotFound),
            },
            // std folds every getaddrinfo failure into an opaque error; only
            // these kinds say the lookup never really ran.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::InvalidInput
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                ) =>
            {
                Err(ResolveError::Lookup(err))
            }
            Err(_) => Err(ResolveError::NotFound),
        }
    }
}
