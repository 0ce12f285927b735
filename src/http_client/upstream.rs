//! Transport seam between the fetcher and the network.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::FetchError;

/// A raw upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

/// Issues one GET as a particular egress identity.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(
        &self,
        url: &str,
        identity: &str,
        user_agent: &str,
    ) -> Result<UpstreamResponse, FetchError>;
}

/// How an identity is presented to the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Send the identity as an `X-Forwarded-For` header.
    #[default]
    ForwardedFor,
    /// Bind the outgoing socket to the identity as a local address.
    BindLocal,
}

const REFERER: &str = "https://www.naver.com/";
const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

/// reqwest-backed upstream.
#[derive(Clone)]
pub struct ReqwestUpstream {
    client: Client,
    timeout: Duration,
    mode: IdentityMode,
    /// One client per bound local address (`BindLocal` only).
    bound: Arc<RwLock<HashMap<IpAddr, Client>>>,
}

impl ReqwestUpstream {
    pub fn new(timeout: Duration, mode: IdentityMode) -> Result<Self, FetchError> {
        Ok(Self {
            client: Self::build_client(timeout, None)?,
            timeout,
            mode,
            bound: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn build_client(timeout: Duration, local: Option<IpAddr>) -> Result<Client, FetchError> {
        Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .local_address(local)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))
    }

    async fn client_for(&self, identity: &str) -> Result<Client, FetchError> {
        let addr: IpAddr = identity
            .parse()
            .map_err(|_| FetchError::Transport(format!("not an IP address: {}", identity)))?;

        if let Some(client) = self.bound.read().await.get(&addr) {
            return Ok(client.clone());
        }

        let client = Self::build_client(self.timeout, Some(addr))?;
        self.bound.write().await.insert(addr, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn get(
        &self,
        url: &str,
        identity: &str,
        user_agent: &str,
    ) -> Result<UpstreamResponse, FetchError> {
        let mut request = match self.mode {
            IdentityMode::ForwardedFor => self.client.get(url).header("X-Forwarded-For", identity),
            IdentityMode::BindLocal => self.client_for(identity).await?.get(url),
        };
        request = request
            .header("User-Agent", user_agent)
            .header("Referer", REFERER)
            .header("Accept-Language", ACCEPT_LANGUAGE);

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(UpstreamResponse { status, body })
    }
}
