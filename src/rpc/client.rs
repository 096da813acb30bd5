use std::{
    future::Future,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use alloy::{
    consensus::Transaction as _,
    eips::BlockNumberOrTag,
    network::TransactionResponse,
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::Filter,
};
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use url::Url;

use crate::{
    abis::IArenaFactory,
    config::RpcSettings,
    error::RpcError,
    rpc::{
        metadata::{self, TokenMetadata, MULTICALL_BATCH_SIZE},
        ChainLog, ChainSource, LogQuery, RequestBudget, RetryPolicy, TxInfo,
    },
};

struct Endpoint {
    url: String,
    provider: DynProvider,
}

/// JSON-RPC client over an ordered list of endpoints.
///
/// Every request goes through the same path: take a slot from the request
/// budget, call the current endpoint with a timeout, and on a retryable
/// failure rotate to the next endpoint and back off exponentially.
pub struct RpcClient {
    endpoints: Vec<Endpoint>,
    current: AtomicUsize,
    requests: AtomicU64,
    retry: RetryPolicy,
    budget: RequestBudget,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(settings: &RpcSettings) -> Result<Self, RpcError> {
        let urls = settings.endpoint_urls();
        if urls.is_empty() {
            return Err(RpcError::NoEndpoints);
        }

        let endpoints = urls
            .into_iter()
            .map(|url| {
                let parsed = Url::parse(&url).map_err(|e| RpcError::InvalidEndpoint {
                    url: redact(&url),
                    reason: e.to_string(),
                })?;
                let provider = DynProvider::new(ProviderBuilder::new().connect_http(parsed));
                Ok(Endpoint { url, provider })
            })
            .collect::<Result<Vec<_>, RpcError>>()?;

        Ok(Self {
            endpoints,
            current: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            retry: RetryPolicy::from_settings(settings),
            budget: RequestBudget::from_settings(settings),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    /// Build a client and select the first endpoint that answers
    /// `eth_blockNumber`. Returns the client and the observed head.
    pub async fn connect(settings: &RpcSettings) -> Result<(Self, u64), RpcError> {
        let client = Self::new(settings)?;

        for (i, endpoint) in client.endpoints.iter().enumerate() {
            let check = tokio::time::timeout(client.timeout, endpoint.provider.get_block_number());
            match check.await {
                Ok(Ok(head)) => {
                    info!("Using RPC {} (block: {})", redact(&endpoint.url), head);
                    client.current.store(i, Ordering::Relaxed);
                    return Ok((client, head));
                },
                Ok(Err(e)) => warn!("RPC {} failed: {}", redact(&endpoint.url), e),
                Err(_) => warn!("RPC {} timed out", redact(&endpoint.url)),
            }
        }

        Err(RpcError::NoHealthyEndpoint(client.endpoints.len()))
    }

    /// Start rotation at `index` (modulo the endpoint count). Used to spread
    /// backfill workers over endpoints.
    pub fn with_preferred_endpoint(self, index: usize) -> Self {
        self.current
            .store(index % self.endpoints.len(), Ordering::Relaxed);
        self
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// URL of the endpoint the next request goes to, with credentials hidden.
    pub fn current_endpoint(&self) -> String {
        let idx = self.current.load(Ordering::Relaxed) % self.endpoints.len();
        redact(&self.endpoints[idx].url)
    }

    fn rotate(&self, from: usize) {
        let next = (from + 1) % self.endpoints.len();
        // Only rotate if nobody else already did
        let _ = self
            .current
            .compare_exchange(from, next, Ordering::Relaxed, Ordering::Relaxed);
    }

    /// Requests sent so far, retries included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Multicall fallback: one `eth_call` per field. Decimals is required,
    /// the other fields degrade to empty.
    async fn single_token_metadata(&self, token: Address) -> Option<TokenMetadata> {
        let decimals = match self
            .execute("decimals", |p| async move { metadata::fetch_decimals(&p, token).await })
            .await
        {
            Ok(decimals) => decimals,
            Err(e) => {
                debug!("No decimals for {}: {}", token, e);
                return None;
            },
        };

        let name = self
            .execute("name", |p| async move { metadata::fetch_name(&p, token).await })
            .await
            .unwrap_or_default();
        let symbol = self
            .execute("symbol", |p| async move { metadata::fetch_symbol(&p, token).await })
            .await
            .unwrap_or_default();
        let total_supply = self
            .execute("totalSupply", |p| async move {
                metadata::fetch_total_supply(&p, token).await
            })
            .await
            .ok();

        Some(TokenMetadata {
            address: token,
            name,
            symbol,
            decimals,
            total_supply,
        })
    }

    async fn execute<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, RpcError>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            self.budget.acquire().await;
            self.requests.fetch_add(1, Ordering::Relaxed);

            let idx = self.current.load(Ordering::Relaxed) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];

            let error = match tokio::time::timeout(self.timeout, call(endpoint.provider.clone()))
                .await
            {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => RpcError::Timeout(self.timeout),
            };

            if !error.is_retryable() {
                return Err(error);
            }

            self.rotate(idx);

            if attempt + 1 < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    "{} failed on {} (attempt {}/{}): {}. Retrying in {:?}",
                    op,
                    redact(&endpoint.url),
                    attempt + 1,
                    self.retry.max_attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            last_error = Some(error);
        }

        Err(RpcError::Exhausted {
            op,
            attempts: self.retry.max_attempts,
            last: Box::new(last_error.unwrap_or(RpcError::NoEndpoints)),
        })
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.execute("eth_blockNumber", |p| async move {
            p.get_block_number()
                .await
                .map_err(RpcError::from_transport)
        })
        .await
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, RpcError> {
        let mut filter = Filter::new()
            .from_block(query.from_block)
            .to_block(query.to_block)
            .event_signature(query.topic0);
        if !query.addresses.is_empty() {
            filter = filter.address(query.addresses.clone());
        }

        let logs = self
            .execute("eth_getLogs", |p| {
                let filter = filter.clone();
                async move { p.get_logs(&filter).await.map_err(RpcError::from_transport) }
            })
            .await?;

        logs.into_iter()
            .map(|log| {
                let (Some(block_number), Some(tx_hash), Some(log_index)) =
                    (log.block_number, log.transaction_hash, log.log_index)
                else {
                    return Err(RpcError::Decode(format!(
                        "pending log without block/tx/index in range {}..={}",
                        query.from_block, query.to_block
                    )));
                };

                Ok(ChainLog {
                    address: log.inner.address,
                    topics: log.inner.data.topics().to_vec(),
                    data: log.inner.data.data.clone(),
                    block_number,
                    tx_hash,
                    log_index,
                })
            })
            .collect()
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TxInfo>, RpcError> {
        self.execute("eth_getTransactionByHash", |p| async move {
            let tx = p
                .get_transaction_by_hash(hash)
                .await
                .map_err(RpcError::from_transport)?;

            Ok(tx.map(|tx| TxInfo {
                hash,
                from: tx.from(),
                value: tx.value(),
            }))
        })
        .await
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, RpcError> {
        self.execute("eth_getBlockByNumber", |p| async move {
            let block = p
                .get_block_by_number(BlockNumberOrTag::Number(block))
                .await
                .map_err(RpcError::from_transport)?;

            Ok(block.map(|b| b.header.timestamp))
        })
        .await
    }

    async fn get_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, RpcError> {
        self.execute("getPair", |p| async move {
            IArenaFactory::new(factory, &p)
                .getPair(token_a, token_b)
                .call()
                .await
                .map_err(RpcError::from_contract)
        })
        .await
    }

    async fn token_metadata(
        &self,
        tokens: &[Address],
    ) -> Result<Vec<Option<TokenMetadata>>, RpcError> {
        let mut all_tokens = Vec::with_capacity(tokens.len());

        for chunk in tokens.chunks(MULTICALL_BATCH_SIZE) {
            let batch = self
                .execute("aggregate3", |p| async move {
                    metadata::fetch_metadata_chunk(&p, chunk).await
                })
                .await;

            match batch {
                Ok(batch) => all_tokens.extend(batch),
                Err(e) => {
                    warn!(
                        "Multicall failed for {} tokens, falling back to single calls: {}",
                        chunk.len(),
                        e
                    );
                    let tasks = chunk.iter().map(|token| self.single_token_metadata(*token));
                    all_tokens.extend(join_all(tasks).await);
                },
            }
        }

        Ok(all_tokens)
    }
}

/// Hide API keys embedded in endpoint URLs before logging them.
fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let segments: Vec<String> = parsed
                .path_segments()
                .map(|s| s.map(str::to_string).collect())
                .unwrap_or_default();

            let _ = parsed.set_password(None);
            let _ = parsed.set_username("");
            parsed.set_query(None);

            // Key-looking trailing segments (ankr, alchemy) are masked
            if let Some(last) = segments.last() {
                let key_like = last
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if last.len() >= 16 && key_like {
                    let mut masked = segments.clone();
                    if let Some(m) = masked.last_mut() {
                        *m = "***".to_string();
                    }
                    parsed.set_path(&masked.join("/"));
                }
            }

            parsed.to_string()
        },
        Err(_) => "<invalid url>".to_string(),
    }
}
