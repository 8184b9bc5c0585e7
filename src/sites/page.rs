use crate::alert::BlockKind;
use crate::config::schema::PageSiteConfig;
use crate::site::{ScrapeContext, ScrapeOutcome, SiteScraper};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

/// Fetches a fixed list of pages through the domain's sticky proxy and stores
/// a small record per successful fetch. No content is parsed.
pub struct PageSite {
    name: String,
    urls: Vec<String>,
    timeout: Duration,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

enum Fetch {
    Ok { status: u16, bytes: usize },
    Blocked(StatusCode),
    Failed(String),
}

impl PageSite {
    pub fn new(config: &PageSiteConfig) -> Self {
        Self {
            name: config.name.clone(),
            urls: config.urls.clone(),
            timeout: Duration::from_secs(30),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client_for(&self, proxy: Option<&str>) -> anyhow::Result<Client> {
        let key = proxy.map(str::to_string);
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .user_agent("scrape-dispatch/0.1");
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url(proxy))?);
        }
        let client = builder.build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    async fn fetch(&self, client: &Client, url: &str) -> Fetch {
        let res = match client.get(url).send().await {
            Ok(res) => res,
            Err(e) => return Fetch::Failed(e.to_string()),
        };

        let status = res.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Fetch::Blocked(status);
        }
        if !status.is_success() {
            return Fetch::Failed(format!("HTTP error: {}", status));
        }

        match res.bytes().await {
            Ok(body) => Fetch::Ok {
                status: status.as_u16(),
                bytes: body.len(),
            },
            Err(e) => Fetch::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl SiteScraper for PageSite {
    async fn run_scraper(&self, ctx: &ScrapeContext) -> anyhow::Result<ScrapeOutcome> {
        let mut outcome = ScrapeOutcome::default();

        for url in &self.urls {
            if ctx.shutdown.is_triggered() {
                break;
            }

            let domain = domain_of(url).unwrap_or_else(|| url.clone());
            let proxy = match &ctx.proxies {
                Some(manager) => match manager.get_proxy(&domain, false) {
                    Ok(proxy) => Some(proxy),
                    Err(e) => {
                        log::warn!("{}: {}; fetching {} directly", self.name, e, url);
                        None
                    }
                },
                None => None,
            };

            let client = self.client_for(proxy.as_deref())?;
            log::info!("Visiting: {}", url);
            let started = Instant::now();
            let result = self.fetch(&client, url).await;
            let latency = started.elapsed().as_secs_f64();

            match result {
                Fetch::Ok { status, bytes } => {
                    if let (Some(manager), Some(proxy)) = (&ctx.proxies, &proxy) {
                        manager.report_success(proxy, latency);
                    }
                    let item = json!({
                        "site": self.name,
                        "url": url,
                        "status": status,
                        "bytes": bytes,
                        "fetched_at": Utc::now().to_rfc3339(),
                    });
                    ctx.storage.save(&ctx.category, item).await;
                    ctx.alerts.on_scrape_success(&ctx.category, &self.name).await;
                    outcome.items_scraped += 1;
                }
                Fetch::Blocked(status) => {
                    log::warn!("{} blocked with HTTP {}", url, status);
                    if let Some(manager) = &ctx.proxies {
                        if let Some(proxy) = &proxy {
                            manager.report_failure(proxy);
                        }
                        manager.rotate(&domain);
                    }
                    ctx.alerts
                        .on_block_detected(&ctx.category, BlockKind::Block, Some(url))
                        .await;
                    outcome.errors += 1;
                }
                Fetch::Failed(error) => {
                    log::warn!("Failed to fetch {}: {}", url, error);
                    if let (Some(manager), Some(proxy)) = (&ctx.proxies, &proxy) {
                        manager.report_failure(proxy);
                    }
                    ctx.alerts
                        .on_scrape_error(&ctx.category, &error, Some(url))
                        .await;
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }
}

pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{}", proxy)
    }
}
