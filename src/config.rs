use std::{fmt, fs, path::Path};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer};
use url::Url;

/// Where the identity provider sends the browser after login. Mendeley only checks that it
/// matches the one registered for the client id; nothing listens on it.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/bibtexexport";
pub const DEFAULT_API_URL: &str = "https://api.mendeley.com";

/// Prefix of the environment variables that may override the credentials from the file.
const ENV_PREFIX: &str = "MENDELEY_";

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(deserialize_with = "scalar_string")]
    pub client_id: String,
    #[serde(deserialize_with = "scalar_string")]
    pub username: String,
    #[serde(deserialize_with = "scalar_string")]
    pub password: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_url")]
    pub api_url: Url,
}

/// Client ids are numeric, so YAML hands them over as integers unless quoted.
fn scalar_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        UInt(u64),
    }

    Ok(match Scalar::deserialize(de)? {
        Scalar::Str(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::UInt(n) => n.to_string(),
    })
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API url is valid")
}

impl Config {
    /// Read and parse the YAML file at `path`.
    ///
    /// The file has to exist and be valid UTF-8; a missing file is an error rather than an
    /// empty configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Yaml::string(text))
            .merge(Env::prefixed(ENV_PREFIX).only(&["username", "password"]))
            .extract::<Config>()?;
        Ok(config)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}
