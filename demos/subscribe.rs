//! A demo binary: connects to a single node and prints every document the subscription delivers.

use std::sync::Arc;

use async_trait::async_trait;
use docdb_subscribe::{
    DocumentTypeDescriptor, SubscriptionOpeningStrategy, SubscriptionOptions, SubscriptionWorker,
    TcpConnectionInfo, TopologyClient, TopologyNode,
};
use structopt::StructOpt;
use tokio_rustls::rustls::Certificate;
use tracing::{error, info};
use url::Url;

#[derive(Debug, StructOpt)]
#[structopt(name = "docdb-subscribe-demo")]
struct Options {
    /// URL of the node to connect to, e.g. tcp://127.0.0.1:38888
    #[structopt(long)]
    node_url: Url,

    /// Database to subscribe against.
    #[structopt(long)]
    database: String,

    /// Name of an existing subscription on that database.
    #[structopt(long)]
    subscription_name: String,

    /// PEM file of an additional certificate to trust, for a `tcps://` node URL.
    #[structopt(long)]
    trust_certificate: Option<std::path::PathBuf>,
}

/// A [`TopologyClient`] that always resolves to the single node given on the command line; a
/// real client library's topology cache would track the whole cluster and answer redirects by
/// looking up the named node instead of ignoring it.
struct SingleNodeTopology {
    node: TopologyNode,
}

#[async_trait]
impl TopologyClient for SingleNodeTopology {
    async fn get_tcp_info(
        &self,
        chosen_node: Option<&str>,
    ) -> Result<TcpConnectionInfo, docdb_subscribe::SubscriptionWorkerError> {
        Ok(TcpConnectionInfo {
            url: self.node.url.clone(),
            certificate: self.node.certificate.clone(),
            requested_node: chosen_node
                .unwrap_or(&self.node.cluster_tag)
                .to_string(),
        })
    }

    async fn get_topology_nodes(
        &self,
    ) -> Result<Vec<TopologyNode>, docdb_subscribe::SubscriptionWorkerError> {
        Ok(vec![self.node.clone()])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let options = Options::from_args();

    let certificate = options
        .trust_certificate
        .as_deref()
        .map(docdb_subscribe::transport::pem::read_certificates)
        .transpose()?
        .and_then(|mut certs: Vec<Certificate>| certs.pop());

    let topology = Arc::new(SingleNodeTopology {
        node: TopologyNode {
            cluster_tag: "A".to_string(),
            url: options.node_url,
            certificate,
        },
    });

    let mut subscription_options = SubscriptionOptions::new(
        options.subscription_name,
        DocumentTypeDescriptor::new("Document"),
    )?;
    subscription_options.strategy(SubscriptionOpeningStrategy::OpenIfFree);

    let worker = SubscriptionWorker::new(options.database, subscription_options, topology);

    worker.on_error(|err| error!(error = %err, "subscription error"));
    worker.on_connection_retry(|err| info!(error = %err, "retrying connection"));
    worker.on_end(|err| match err {
        Some(err) => error!(error = %err, "subscription ended"),
        None => info!("subscription ended"),
    });
    worker.on_batch(|batch| async move {
        for document in batch.items() {
            println!("{}", serde_json::to_string(document).unwrap_or_default());
        }
        Ok(())
    });

    tokio::signal::ctrl_c().await?;
    worker.dispose().await;
    Ok(())
}
