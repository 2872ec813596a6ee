#![forbid(unsafe_code)]

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("no referrer entry for {referrer}")]
    UnknownReferrer { referrer: String },

    #[error("{subresource} is not a learned subresource of {referrer}")]
    UnknownSubresource {
        referrer: String,
        subresource: String,
    },
}
