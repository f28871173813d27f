/// Errors raised while reading or upgrading coding schemes.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    /// The payload does not match the expected JSON shape.
    #[error("invalid scheme json: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is neither a coding list nor a scheme object.
    #[error("unrecognized scheme layout: {0}")]
    Layout(String),

    /// The declared scheme version cannot be read.
    #[error("unsupported scheme version '{version}'")]
    UnsupportedVersion { version: String },
}
