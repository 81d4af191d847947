use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_message() {
        let err = Error::Usage("provide config file with '-c' option");
        assert_eq!(err.to_string(), "provide config file with '-c' option");

        let err = Error::Config("host tcp://10.0.0.1:80 has weight 0".to_owned());
        assert_eq!(err.to_string(), "invalid config: host tcp://10.0.0.1:80 has weight 0");
    }
}
