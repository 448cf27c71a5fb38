// src/scrape/http.rs
//! `reqwest`-backed scraper, optionally routed through a Tor SOCKS proxy.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use super::{html, Scraper, Snapshot};
use crate::config::engine::HttpSettings;
use crate::error::{Error, Result};
use crate::model::{PageSnapshot, ThreadContent};

const TOR_CHECK_URL: &str = "https://check.torproject.org/api/ip";

#[derive(Debug, Deserialize)]
struct TorStatus {
    #[serde(rename = "IsTor")]
    is_tor: bool,
    #[serde(rename = "IP", default)]
    ip: Option<String>,
}

pub struct HttpScraper {
    client: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
    require_tor: bool,
    tor_verified: OnceCell<()>,
}

impl HttpScraper {
    pub fn new(settings: &HttpSettings) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .danger_accept_invalid_certs(settings.accept_invalid_certs);
        if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy URL {proxy}"))?,
            );
            info!(proxy, "scraper traffic routed through proxy");
        }
        let client = builder.build().context("building HTTP client")?;

        Ok(Self {
            client,
            max_attempts: settings.retries.max(1),
            backoff: Duration::from_millis(settings.retry_backoff_ms),
            require_tor: settings.require_tor,
            tor_verified: OnceCell::new(),
        })
    }

    /// Confirms once that traffic exits through Tor; later calls reuse the
    /// verdict. A failed check is retried on the next call.
    async fn ensure_tor(&self) -> Result<()> {
        if !self.require_tor {
            return Ok(());
        }
        self.tor_verified
            .get_or_try_init(|| async {
                let status: TorStatus = self
                    .client
                    .get(TOR_CHECK_URL)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::unreachable(TOR_CHECK_URL, e))?
                    .json()
                    .await
                    .map_err(|e| Error::unusable(TOR_CHECK_URL, e))?;
                if !status.is_tor {
                    return Err(Error::unreachable(
                        TOR_CHECK_URL,
                        "client is not connected to the Tor network",
                    ));
                }
                info!(exit_ip = status.ip.as_deref().unwrap_or("?"), "connected to Tor network");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// GET with linear backoff. Transport errors and 5xx responses are
    /// retried; any other non-2xx status fails at once.
    async fn get_html(&self, address: &str) -> Result<String> {
        self.ensure_tor().await?;
        let url = Url::parse(address)
            .map_err(|e| Error::InvalidInput(format!("malformed address '{address}': {e}")))?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.client.get(url.clone()).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        match rsp.text().await {
                            Ok(body) => {
                                debug!(address, attempt, bytes = body.len(), "fetched");
                                return Ok(body);
                            }
                            Err(e) => Error::unreachable(address, format!("reading body: {e}")),
                        }
                    } else if status.is_server_error() {
                        Error::unusable(address, format!("HTTP {status}"))
                    } else {
                        return Err(Error::unusable(address, format!("HTTP {status}")));
                    }
                }
                Err(e) => Error::unreachable(address, e),
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }
            warn!(address, attempt, error = %err, "fetch failed, retrying");
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch_snapshot(&self, address: &str) -> Result<Snapshot> {
        let body = self.get_html(address).await?;
        if body.trim().is_empty() {
            return Err(Error::unusable(address, "empty page"));
        }
        let engine = html::identify_engine(&body);
        Ok(Snapshot {
            page: PageSnapshot {
                digest: html::digest(&body),
                html: body,
                screenshot: None,
            },
            engine,
        })
    }

    async fn enumerate_threads(&self, address: &str) -> Result<Vec<String>> {
        let body = self.get_html(address).await?;
        let base = Url::parse(address)
            .map_err(|e| Error::InvalidInput(format!("malformed address '{address}': {e}")))?;
        Ok(html::thread_links(&body, &base))
    }

    async fn fetch_thread_content(&self, address: &str) -> Result<ThreadContent> {
        let body = self.get_html(address).await?;
        Ok(html::thread_content(&body))
    }
}
