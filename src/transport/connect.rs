//! C1 — opening a fresh TCP (optionally TLS) stream to a node's URL.
//!
//! Per section 4.1, the transport is never reused across reconnect attempts: every iteration of
//! the outer loop in [`crate::reconnect`] calls [`connect`] again from scratch.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::{
    rustls::{Certificate, ClientConfig},
    webpki::DNSNameRef,
    TlsConnector,
};
use url::Url;

use crate::error::SubscriptionWorkerError;
use crate::transport::io_stream::IoStream;

/// Open a connection to `url`. A scheme of `tcps` negotiates TLS (trusting `certificate`, if
/// given, in addition to the platform's default roots); any other scheme (`tcp` by convention)
/// connects in the clear.
pub async fn connect(
    url: &Url,
    certificate: Option<&Certificate>,
) -> Result<IoStream, SubscriptionWorkerError> {
    let host = url
        .host_str()
        .ok_or_else(|| SubscriptionWorkerError::protocol_violation("node URL has no host"))?;
    let port = url
        .port()
        .ok_or_else(|| SubscriptionWorkerError::protocol_violation("node URL has no port"))?;

    let tcp_stream = TcpStream::connect((host, port)).await?;
    // Subscription frames are small and latency-sensitive; don't let Nagle's algorithm batch them.
    tcp_stream.set_nodelay(true)?;

    if url.scheme() == "tcps" {
        let mut tls_config = ClientConfig::new();
        tls_config
            .root_store
            .add_server_trust_anchors(&webpki_roots::TLS_SERVER_ROOTS);
        if let Some(certificate) = certificate {
            tls_config
                .root_store
                .add(certificate)
                .map_err(|_| SubscriptionWorkerError::protocol_violation(
                    "node certificate could not be added to the trust store",
                ))?;
        }

        let dns_name = DNSNameRef::try_from_ascii_str(host).map_err(|_| {
            SubscriptionWorkerError::protocol_violation(format!("invalid DNS name: {host}"))
        })?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let tls_stream = connector.connect(dns_name, tcp_stream).await?;
        Ok(IoStream::from(tls_stream))
    } else {
        Ok(IoStream::from(tcp_stream))
    }
}
