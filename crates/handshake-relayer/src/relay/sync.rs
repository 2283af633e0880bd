// Header synchronization: fresh, verified counterparty headers for each round
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::chains::{ChainRef, Header};
use crate::error::RelayerError;
use crate::utils::short_hash;

/// Headers of one round keyed by the chain they originate from
pub type HeaderMap = HashMap<String, Header>;

/// Fetch the latest header of `chain` and verify it as a successor of the last synced height
///
/// The per-chain lock is held across fetch, verification and the height write,
/// so concurrent attempts on the same chain never move the height backwards.
pub async fn sync_header(chain: &ChainRef) -> Result<Header, RelayerError> {
    let sync_error = |reason: String| RelayerError::LightClientSync {
        chain_id: chain.chain_id().to_string(),
        reason,
    };

    let mut synced = chain.sync_lock().lock().await;

    let header = chain
        .handle()
        .latest_header()
        .await
        .map_err(|e| sync_error(format!("header fetch failed: {}", e)))?;

    if header.chain_id != chain.chain_id() {
        return Err(sync_error(format!(
            "header belongs to {}, expected {}",
            header.chain_id,
            chain.chain_id()
        )));
    }

    if header.height <= *synced {
        warn!(
            "Stale header from {}: height {} does not exceed last synced height {}",
            chain.chain_id(),
            header.height,
            *synced
        );
        return Err(sync_error(format!(
            "stale header at height {}, last synced height is {}",
            header.height, *synced
        )));
    }

    chain
        .handle()
        .accepts_header(&header)
        .await
        .map_err(|e| sync_error(format!("header at height {} rejected: {}", header.height, e)))?;

    *synced = header.height;
    debug!(
        chain_id = %chain.chain_id(),
        height = header.height,
        app_hash = %short_hash(&header.app_hash),
        "header synchronized"
    );

    Ok(header)
}

/// Synchronize both chains of a path concurrently
pub async fn sync_headers(a: &ChainRef, b: &ChainRef) -> Result<HeaderMap, RelayerError> {
    let (header_a, header_b) = futures::try_join!(sync_header(a), sync_header(b))?;

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(header_a.chain_id.clone(), header_a);
    headers.insert(header_b.chain_id.clone(), header_b);
    Ok(headers)
}

/// Header of `chain_id` from a synchronized round
pub fn header_for<'a>(headers: &'a HeaderMap, chain_id: &str) -> Result<&'a Header, RelayerError> {
    headers.get(chain_id).ok_or_else(|| RelayerError::LightClientSync {
        chain_id: chain_id.to_string(),
        reason: "no synchronized header for this round".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::MockChain;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_heights_strictly_increase() {
        let a = ChainRef::new(Arc::new(MockChain::new("ibc-0")));
        let b = ChainRef::new(Arc::new(MockChain::new("ibc-1")));

        let first = sync_headers(&a, &b).await.unwrap();
        let second = sync_headers(&a, &b).await.unwrap();

        for chain_id in ["ibc-0", "ibc-1"] {
            let h1 = header_for(&first, chain_id).unwrap().height;
            let h2 = header_for(&second, chain_id).unwrap().height;
            assert!(h2 > h1, "{}: {} !> {}", chain_id, h2, h1);
        }
        assert_eq!(a.synced_height().await, header_for(&second, "ibc-0").unwrap().height);
    }

    #[tokio::test]
    async fn test_stale_header_fails_fast() {
        let mock = Arc::new(MockChain::new("ibc-0"));
        let chain = ChainRef::new(mock.clone());

        let header = sync_header(&chain).await.unwrap();
        mock.freeze_height(true);

        let err = sync_header(&chain).await.unwrap_err();
        assert!(matches!(err, RelayerError::LightClientSync { .. }));
        assert!(err.is_retryable());
        // the failed round leaves the synced height untouched
        assert_eq!(chain.synced_height().await, header.height);
    }

    #[tokio::test]
    async fn test_forged_header_is_rejected() {
        let mock = Arc::new(MockChain::new("ibc-0"));
        let chain = ChainRef::new(mock.clone());

        mock.forge_next_header();
        let err = sync_header(&chain).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert_eq!(chain.synced_height().await, 0);
    }

    #[test]
    fn test_missing_header_lookup() {
        let headers = HeaderMap::new();
        assert!(matches!(
            header_for(&headers, "ibc-0"),
            Err(RelayerError::LightClientSync { .. })
        ));
    }
}
