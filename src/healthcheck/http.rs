use super::ReadinessCheck;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Readiness via HTTP GET: any 2xx status passes.
pub struct HttpCheck {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpCheck {
    /// # Errors
    ///
    /// Returns error if URL is malformed or uses unsupported scheme.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        Self::validate_url(&url)?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url,
            client,
            timeout,
        })
    }

    /// Validate that a URL is well-formed and uses HTTP/HTTPS scheme.
    fn validate_url(url: &str) -> Result<()> {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let scheme = parsed.scheme();
                if scheme != "http" && scheme != "https" {
                    return Err(Error::Config(format!(
                        "Invalid readiness URL '{}': scheme must be http or https, got '{}'",
                        url, scheme
                    )));
                }
                Ok(())
            }
            Err(e) => Err(Error::Config(format!(
                "Invalid readiness URL '{}': {}",
                url, e
            ))),
        }
    }
}

#[async_trait]
impl ReadinessCheck for HttpCheck {
    async fn probe(&self) -> std::result::Result<(), String> {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("HTTP {}", response.status())),
            Err(e) if e.is_timeout() => Err(format!("no response within {:?}", self.timeout)),
            Err(e) if e.is_connect() => Err("connection refused".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }
}
