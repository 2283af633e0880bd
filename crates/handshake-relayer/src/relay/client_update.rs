// Light client registration and updates
// Every message here carries a header synchronized in the same call.

use std::time::Duration;
use tracing::info;

use crate::chains::Receipt;
use crate::error::RelayerError;
use crate::relay::dispatch::dispatch;
use crate::relay::msgs::Msg;
use crate::relay::path::{PathEnd, PathKind};
use crate::relay::sync::{sync_header, sync_headers, header_for};

/// Default trusting period for newly created clients
pub const DEFAULT_TRUSTING_PERIOD: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Create a client for `dst` on `src`'s chain
pub async fn create_client(
    src: &mut PathEnd,
    dst: &PathEnd,
    client_id: &str,
    trusting_period: Duration,
) -> Result<Receipt, RelayerError> {
    src.set_path_identifier(PathKind::Client, client_id)?;
    let header = sync_header(dst.chain()).await?;

    info!(
        "🆕 Creating client {} on {} tracking {} from height {}",
        client_id,
        src.chain_id(),
        dst.chain_id(),
        header.height
    );
    let msg = Msg::CreateClient {
        client_id: client_id.to_string(),
        header,
        trusting_period_secs: trusting_period.as_secs(),
    };
    dispatch(src.chain(), &[msg]).await
}

/// Create a client on each chain tracking the other
///
/// Each client ID is recorded only on the side whose chain hosts the client.
pub async fn create_clients(
    src: &mut PathEnd,
    dst: &mut PathEnd,
    src_client_id: &str,
    dst_client_id: &str,
) -> Result<(Receipt, Receipt), RelayerError> {
    create_clients_with_trusting_period(src, dst, src_client_id, dst_client_id, DEFAULT_TRUSTING_PERIOD)
        .await
}

pub async fn create_clients_with_trusting_period(
    src: &mut PathEnd,
    dst: &mut PathEnd,
    src_client_id: &str,
    dst_client_id: &str,
    trusting_period: Duration,
) -> Result<(Receipt, Receipt), RelayerError> {
    src.set_path_identifier(PathKind::Client, src_client_id)?;
    dst.set_path_identifier(PathKind::Client, dst_client_id)?;

    let headers = sync_headers(src.chain(), dst.chain()).await?;
    let src_header = header_for(&headers, src.chain_id())?.clone();
    let dst_header = header_for(&headers, dst.chain_id())?.clone();

    info!(
        "🆕 Creating clients {} on {} and {} on {}",
        src_client_id,
        src.chain_id(),
        dst_client_id,
        dst.chain_id()
    );

    let src_receipt = dispatch(
        src.chain(),
        &[Msg::CreateClient {
            client_id: src_client_id.to_string(),
            header: dst_header,
            trusting_period_secs: trusting_period.as_secs(),
        }],
    )
    .await?;

    let dst_receipt = dispatch(
        dst.chain(),
        &[Msg::CreateClient {
            client_id: dst_client_id.to_string(),
            header: src_header,
            trusting_period_secs: trusting_period.as_secs(),
        }],
    )
    .await?;

    Ok((src_receipt, dst_receipt))
}

/// Update `src`'s client of `dst` to `dst`'s latest header
pub async fn update_client(
    src: &mut PathEnd,
    dst: &PathEnd,
    client_id: &str,
) -> Result<Receipt, RelayerError> {
    src.set_path_identifier(PathKind::Client, client_id)?;
    let header = sync_header(dst.chain()).await?;

    info!(
        "🔄 Updating client {} on {} to {} height {}",
        client_id,
        src.chain_id(),
        dst.chain_id(),
        header.height
    );
    let msg = Msg::UpdateClient {
        client_id: client_id.to_string(),
        header,
    };
    dispatch(src.chain(), &[msg]).await
}
