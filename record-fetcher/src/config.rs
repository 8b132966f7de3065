use serde::Deserialize;
use url::Url;

fn default_api_url() -> Url {
    Url::parse("https://api.go.knackly.io").expect("static URL is valid")
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the upstream document-automation API.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct UpstreamConfig {
    /// Scheme and host of the API, without the tenancy path.
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    pub tenancy: String,
    /// Pre-issued bearer token.
    pub api_token: String,
    /// Applies to each request as a whole.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// `{api_url}/{tenancy}/api/v1`
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend([self.tenancy.as_str(), "api", "v1"]);
        Ok(url)
    }
}
