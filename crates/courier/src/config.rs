//! Host options shared by every request an adapter sends.

use std::time::Duration;

use reqwest::redirect::Policy;

use crate::adapter::RequestAdapter;
use crate::error::{RequestError, Result};

/// Configuration for a [`RequestAdapter`].
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    /// Base URL that relative request URLs are joined onto.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Whether to enable cookie storage.
    pub cookies_enabled: bool,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Headers sent with every request.
    pub default_headers: http::HeaderMap,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            cookies_enabled: true,
            user_agent: Some(format!("courier/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            default_headers: http::HeaderMap::new(),
        }
    }
}

impl AdapterConfig {
    /// Build the transport client for this configuration. No I/O happens here.
    pub(crate) fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.follow_redirects {
            builder = builder.redirect(Policy::limited(self.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if self.cookies_enabled {
            builder = builder.cookie_store(true);
        }

        if let Some(ref ua) = self.user_agent {
            builder = builder.user_agent(ua);
        }

        if let Some(ref proxy_url) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(RequestError::Transport)?;
            builder = builder.proxy(proxy);
        }

        builder = builder.default_headers(self.default_headers.clone());

        builder.build().map_err(RequestError::Transport)
    }
}

/// Builder for creating a [`RequestAdapter`] with custom host options.
#[derive(Debug, Default)]
pub struct AdapterBuilder {
    config: AdapterConfig,
}

impl AdapterBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL for relative request URLs.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable cookie storage.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set a proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Result<Self> {
        let name = name
            .try_into()
            .map_err(|_| RequestError::InvalidHeader("Invalid header name".to_string()))?;
        let value = value
            .try_into()
            .map_err(|_| RequestError::InvalidHeader("Invalid header value".to_string()))?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// The configuration built so far.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Build the adapter.
    pub fn build(self) -> Result<RequestAdapter> {
        RequestAdapter::new(self.config)
    }
}
