// Message dispatch: one atomic transaction to exactly one chain
use tracing::{debug, info, warn};

use crate::chains::{ChainError, ChainRef, Receipt};
use crate::error::RelayerError;
use crate::relay::msgs::{MessageBatch, Msg};
use crate::relay::selector::Side;

/// Map a chain failure onto the engine taxonomy
pub(crate) fn classify(chain_id: &str, error: ChainError) -> RelayerError {
    match error {
        ChainError::Rejected { code, log } => RelayerError::Rejected {
            chain_id: chain_id.to_string(),
            code,
            log,
        },
        ChainError::Timeout(reason) => RelayerError::DispatchTimeout {
            chain_id: chain_id.to_string(),
            reason,
        },
        other => RelayerError::Broadcast {
            chain_id: chain_id.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Submit `msgs` to `chain` as a single transaction
///
/// Never retries. A receipt with `success == false` surfaces as `Rejected`.
pub async fn dispatch(chain: &ChainRef, msgs: &[Msg]) -> Result<Receipt, RelayerError> {
    if msgs.is_empty() {
        return Err(RelayerError::EmptyBatch);
    }

    let types: Vec<&str> = msgs.iter().map(Msg::type_url).collect();
    debug!("Dispatching {} messages to {}: {:?}", msgs.len(), chain.chain_id(), types);

    let receipt = chain
        .handle()
        .submit(msgs)
        .await
        .map_err(|e| classify(chain.chain_id(), e))?;

    if !receipt.success {
        warn!(
            "❌ Transaction {} rejected by {} (code {}): {}",
            receipt.tx_hash,
            chain.chain_id(),
            receipt.code,
            receipt.log
        );
        return Err(RelayerError::Rejected {
            chain_id: chain.chain_id().to_string(),
            code: receipt.code,
            log: receipt.log,
        });
    }

    info!(
        "📤 Transaction {} included on {} at height {}",
        receipt.tx_hash,
        chain.chain_id(),
        receipt.height
    );
    Ok(receipt)
}

/// Send a batch to whichever side it targets
pub async fn dispatch_batch(
    src: &ChainRef,
    dst: &ChainRef,
    batch: &MessageBatch,
) -> Result<Receipt, RelayerError> {
    match batch.target() {
        Some(Side::Src) => dispatch(src, batch.src()).await,
        Some(Side::Dst) => dispatch(dst, batch.dst()).await,
        None => Err(RelayerError::EmptyBatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{Chain, MockChain};
    use std::sync::Arc;

    async fn create_client_msg(counterparty: &MockChain) -> Msg {
        Msg::CreateClient {
            client_id: "07-tendermint-0".to_string(),
            header: counterparty.latest_header().await.unwrap(),
            trusting_period_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_refused() {
        let chain = ChainRef::new(Arc::new(MockChain::new("ibc-0")));
        assert!(matches!(dispatch(&chain, &[]).await, Err(RelayerError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_batch_goes_to_one_side_only() {
        let src_mock = Arc::new(MockChain::new("ibc-0"));
        let dst_mock = Arc::new(MockChain::new("ibc-1"));
        let src = ChainRef::new(src_mock.clone());
        let dst = ChainRef::new(dst_mock.clone());

        let msg = create_client_msg(&src_mock).await;
        let batch = MessageBatch::for_side(Side::Dst, vec![msg]);
        let receipt = dispatch_batch(&src, &dst, &batch).await.unwrap();

        assert!(receipt.success);
        assert_eq!(dst_mock.tx_count(), 1);
        assert_eq!(src_mock.tx_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let counterparty = MockChain::new("ibc-1");
        let mock = Arc::new(MockChain::new("ibc-0"));
        let chain = ChainRef::new(mock.clone());
        let msg = create_client_msg(&counterparty).await;

        mock.fail_broadcasts(1);
        let err = dispatch(&chain, &[msg.clone()]).await.unwrap_err();
        assert!(matches!(err, RelayerError::Broadcast { .. }));

        mock.timeout_inclusions(1);
        let err = dispatch(&chain, &[msg.clone()]).await.unwrap_err();
        assert!(matches!(err, RelayerError::DispatchTimeout { .. }));

        // the timed-out transaction was applied, so creating the same client again is refused
        let err = dispatch(&chain, &[msg]).await.unwrap_err();
        assert!(matches!(err, RelayerError::Rejected { .. }));
        assert!(!err.is_retryable());
    }
}
