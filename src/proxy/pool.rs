use crate::config::schema::ProxySourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

/// Where the dispatcher gets its proxy pool from at startup.
#[async_trait]
pub trait ProxySource: Send + Sync {
    fn describe(&self) -> String;
    async fn fetch(&self) -> Result<Vec<String>>;
}

pub struct NoProxySource;

#[async_trait]
impl ProxySource for NoProxySource {
    fn describe(&self) -> String {
        "none".to_string()
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct StaticProxies {
    proxies: Vec<String>,
}

impl StaticProxies {
    pub fn new(proxies: Vec<String>) -> Self {
        Self { proxies }
    }
}

#[async_trait]
impl ProxySource for StaticProxies {
    fn describe(&self) -> String {
        format!("static ({} entries)", self.proxies.len())
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(dedup(self.proxies.iter().map(|p| p.trim())))
    }
}

/// Plain-text proxy list served over HTTP, one `host:port` per line.
pub struct HttpProxyList {
    url: String,
    client: Client,
}

impl HttpProxyList {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("scrape-dispatch/0.1")
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ProxySource for HttpProxyList {
    fn describe(&self) -> String {
        format!("url {}", self.url)
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let res = self.client.get(&self.url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "proxy list {} returned HTTP {}",
                self.url, status
            )));
        }
        let body = res.text().await?;
        Ok(parse_proxy_list(&body))
    }
}

pub fn parse_proxy_list(body: &str) -> Vec<String> {
    dedup(
        body.lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#')),
    )
}

fn dedup<'a>(entries: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn from_config(config: &ProxySourceConfig) -> Result<Box<dyn ProxySource>> {
    Ok(match config {
        ProxySourceConfig::None => Box::new(NoProxySource),
        ProxySourceConfig::Static { proxies } => Box::new(StaticProxies::new(proxies.clone())),
        ProxySourceConfig::Url { url } => Box::new(HttpProxyList::new(url.clone())?),
    })
}
