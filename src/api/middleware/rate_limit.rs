//! Per-client rate limiting for the link creation API.

use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor,
};

/// Sustained requests per second per client IP.
const REPLENISH_PER_SECOND: u64 = 2;
/// Requests a client may fire in a burst.
const BURST_SIZE: u32 = 50;

/// Token bucket keyed by the socket peer address.
///
/// Over-limit requests get `429 Too Many Requests`. The peer address comes
/// from `ConnectInfo`, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`. Redirects are not
/// limited.
pub fn layer() -> GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>
{
    let config = GovernorConfigBuilder::default()
        .per_second(REPLENISH_PER_SECOND)
        .burst_size(BURST_SIZE)
        .finish()
        .expect("rate limit constants are non-zero");

    GovernorLayer::new(Arc::new(config))
}
