use std::time::Duration;

use anyhow::{Context, bail};

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

impl CargoEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the proxy will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // full origin of the portal, scheme included, like http://portal.example.com
    // this is the string that gets hidden from clients
    #[clap(long, env = "IPTV_PROVIDER_DOMAIN")]
    pub upstream_domain: String,

    // when set, the Host header of every request has to end with this or it gets a 403.
    // leave it out if the proxy sits behind something that already filters hosts
    #[clap(long, env)]
    pub proxy_host: Option<String>,

    // scheme clients use to reach the proxy, http unless there's tls in front
    #[clap(long, env, default_value = "http")]
    pub public_scheme: String,

    // temp links containing this need the get_link_for_ch hop before create_link
    #[clap(long, env, default_value = "http://localhost")]
    pub loopback_marker: String,

    // resolved links are trusted for this long
    #[clap(long, env, default_value = "86400")]
    pub cache_ttl_secs: u64,

    // directory for the file backed link cache
    #[clap(long, env, default_value = "iptv_cache")]
    pub cache_dir: String,

    // if set the link cache lives in redis instead of cache_dir
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // every call to the portal gives up after this
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    // create_link calls allowed per throttle window, portals ban you quickly without this
    #[clap(long, env, default_value = "1")]
    pub throttle_budget: u32,

    #[clap(long, env, default_value = "2000")]
    pub throttle_window_ms: u64,

    // in flight client requests, the rest wait their turn
    #[clap(long, env, default_value = "5")]
    pub max_concurrent_requests: usize,

    // production logs go here, rolled daily
    #[clap(long, env, default_value = "logs")]
    pub log_dir: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// checks everything once at startup so the services can trust the values
    pub fn validate(mut self) -> anyhow::Result<Self> {
        let domain = self.upstream_domain.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&domain)
            .with_context(|| format!("invalid upstream domain: {}", domain))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("upstream domain must be http or https, got {}", parsed.scheme());
        }
        if parsed.host_str().is_none() {
            bail!("upstream domain has no host: {}", domain);
        }
        self.upstream_domain = domain;

        if !matches!(self.public_scheme.as_str(), "http" | "https") {
            bail!("public scheme must be http or https, got {}", self.public_scheme);
        }
        if self.loopback_marker.is_empty() {
            bail!("loopback marker can't be empty");
        }
        if self.cache_ttl_secs == 0 {
            bail!("cache ttl must be at least one second");
        }
        if self.upstream_timeout_secs == 0 {
            bail!("upstream timeout must be at least one second");
        }
        if self.throttle_budget == 0 || self.throttle_window_ms == 0 {
            bail!("throttle budget and window must both be positive");
        }
        if self.max_concurrent_requests == 0 {
            bail!("max concurrent requests must be positive");
        }

        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }
}

impl Default for AppConfig {
    // mostly for tests, the real thing always comes from clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            upstream_domain: "http://portal.example.com".to_string(),
            proxy_host: None,
            public_scheme: "http".to_string(),
            loopback_marker: "http://localhost".to_string(),
            cache_ttl_secs: 86400,
            cache_dir: "iptv_cache".to_string(),
            redis_url: None,
            upstream_timeout_secs: 30,
            throttle_budget: 1,
            throttle_window_ms: 2000,
            max_concurrent_requests: 5,
            log_dir: "logs".to_string(),
            sentry_dsn: None,
        }
    }
}
