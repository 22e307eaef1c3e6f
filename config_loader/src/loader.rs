use async_trait::async_trait;
use config::{
    AsyncSource, Config, ConfigBuilder, ConfigError, File, FileFormat, Format, Map, Value,
    builder::AsyncState,
};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, path::PathBuf};

/// Configuration fetched over HTTP, parsed with the given format.
#[derive(Debug)]
pub struct HttpSource<F: Format> {
    uri: String,
    format: F,
}

impl<F: Format> HttpSource<F> {
    pub fn new(uri: impl Into<String>, format: F) -> Self {
        Self {
            uri: uri.into(),
            format,
        }
    }
}

#[async_trait]
impl<F: Format + Send + Sync + Debug> AsyncSource for HttpSource<F> {
    async fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let response = reqwest::get(&self.uri)
            .await
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;

        if !response.status().is_success() {
            return Err(ConfigError::Message(format!(
                "remote config {} answered {}",
                self.uri,
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;

        self.format
            .parse(Some(&self.uri), &text)
            .map_err(ConfigError::Foreign)
    }
}

/// Load a config file; the format is picked from the file extension.
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let config_path = std::fs::canonicalize(PathBuf::from(path))
        .map_err(|e| ConfigError::Message(format!("config file {path}: {e}")))?;

    let settings = Config::builder()
        .add_source(File::from(config_path))
        .build()?;

    settings.try_deserialize::<T>()
}

/// Load configuration asynchronously from a remote HTTP endpoint
pub async fn load_config_async<T>(uri: &str, format: FileFormat) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Send,
{
    let config = ConfigBuilder::<AsyncState>::default()
        .add_async_source(HttpSource::new(uri, format))
        .build()
        .await?;

    config.try_deserialize()
}
