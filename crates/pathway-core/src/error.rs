/// Errors raised while constructing or decoding core protocol values.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid vertex: {0}")]
    InvalidVertex(String),

    #[error("invalid channel update: {0}")]
    InvalidChannelUpdate(String),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
