//! Integration tests driving [`SubscriptionWorker`] against a scripted fake server.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docdb_subscribe::{
    DocumentTypeDescriptor, SubscriptionOptions, SubscriptionWorker, SubscriptionWorkerError,
    TcpConnectionInfo, TopologyClient, TopologyNode,
};
use tokio::sync::Notify;

struct SingleNodeTopology {
    url: url::Url,
}

#[async_trait]
impl TopologyClient for SingleNodeTopology {
    async fn get_tcp_info(
        &self,
        chosen_node: Option<&str>,
    ) -> Result<TcpConnectionInfo, SubscriptionWorkerError> {
        Ok(TcpConnectionInfo {
            url: self.url.clone(),
            certificate: None,
            requested_node: chosen_node.unwrap_or("A").to_string(),
        })
    }

    async fn get_topology_nodes(&self) -> Result<Vec<TopologyNode>, SubscriptionWorkerError> {
        Ok(vec![TopologyNode {
            cluster_tag: "A".to_string(),
            url: self.url.clone(),
            certificate: None,
        }])
    }
}

fn options(name: &str) -> SubscriptionOptions {
    let mut options =
        SubscriptionOptions::new(name, DocumentTypeDescriptor::new("Order")).unwrap();
    options.time_to_wait_before_connection_retry(Duration::from_millis(20));
    options
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_delivers_a_batch_and_acknowledges() {
    let (listener, url) = common::bind_fake_server().await;
    let topology = Arc::new(SingleNodeTopology { url });

    let server = tokio::spawn(async move {
        let mut stream = common::accept_and_negotiate(&listener, 53).await;
        common::write_object(&mut stream, &serde_json::json!({"Type": "ConnectionStatus", "Status": "Accepted"})).await;
        common::write_object(
            &mut stream,
            &serde_json::json!({"Type": "Data", "Id": "orders/1", "ChangeVector": "A:1-aaa", "Total": 42}),
        )
        .await;
        common::write_object(&mut stream, &serde_json::json!({"Type": "EndOfBatch"})).await;

        let ack = common::read_object(&mut stream).await;
        assert_eq!(ack["ChangeVector"], "A:1-aaa");
        common::write_object(&mut stream, &serde_json::json!({"Type": "Confirm"})).await;

        // Clean close: no more batches, nothing in flight.
        drop(stream);
    });

    let worker = SubscriptionWorker::new("orders-db", options("orders"), topology);

    let received = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Notify::new());
    {
        let received = received.clone();
        let done = done.clone();
        worker.on_batch(move |batch| {
            let received = received.clone();
            let done = done.clone();
            async move {
                received.fetch_add(batch.items().len(), Ordering::SeqCst);
                done.notify_waiters();
                Ok(())
            }
        });
    }

    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => panic!("timed out waiting for a batch"),
    }

    assert_eq!(received.load(Ordering::SeqCst), 1);
    server.await.unwrap();
    worker.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn subscription_in_use_ends_the_worker_without_retrying() {
    let (listener, url) = common::bind_fake_server().await;
    let topology = Arc::new(SingleNodeTopology { url });

    let server = tokio::spawn(async move {
        let mut stream = common::accept_and_negotiate(&listener, 53).await;
        common::write_object(
            &mut stream,
            &serde_json::json!({"Type": "ConnectionStatus", "Status": "InUse"}),
        )
        .await;
    });

    let worker = SubscriptionWorker::new("orders-db", options("orders"), topology);

    let ended = Arc::new(Notify::new());
    let error_seen = Arc::new(AtomicUsize::new(0));
    {
        let ended = ended.clone();
        let error_seen = error_seen.clone();
        worker.on_end(move |err| {
            if matches!(err, Some(SubscriptionWorkerError::SubscriptionInUse { .. })) {
                error_seen.fetch_add(1, Ordering::SeqCst);
            }
            ended.notify_waiters();
        });
    }
    worker.on_batch(|_batch| async move { Ok(()) });

    tokio::select! {
        _ = ended.notified() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => panic!("timed out waiting for end"),
    }

    assert_eq!(error_seen.load(Ordering::SeqCst), 1);
    server.abort();
    worker.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn subscriber_error_is_ignored_when_configured() {
    let (listener, url) = common::bind_fake_server().await;
    let topology = Arc::new(SingleNodeTopology { url });

    let server = tokio::spawn(async move {
        let mut stream = common::accept_and_negotiate(&listener, 53).await;
        common::write_object(&mut stream, &serde_json::json!({"Type": "ConnectionStatus", "Status": "Accepted"})).await;
        common::write_object(
            &mut stream,
            &serde_json::json!({"Type": "Data", "Id": "orders/1", "ChangeVector": "A:1-aaa"}),
        )
        .await;
        common::write_object(&mut stream, &serde_json::json!({"Type": "EndOfBatch"})).await;

        let ack = common::read_object(&mut stream).await;
        assert_eq!(ack["ChangeVector"], "A:1-aaa");
        drop(stream);
    });

    let mut opts = options("orders");
    opts.ignore_subscriber_errors(true);
    let worker = SubscriptionWorker::new("orders-db", opts, topology);

    let acked = Arc::new(Notify::new());
    {
        let acked = acked.clone();
        worker.on_batch(move |_batch| {
            let acked = acked.clone();
            async move {
                acked.notify_waiters();
                Err("listener blew up".into())
            }
        });
    }

    tokio::select! {
        _ = acked.notified() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => panic!("timed out waiting for dispatch"),
    }

    server.await.unwrap();
    worker.dispose().await;
}
