// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use gelf_shipper::flusher::FlushOutcome;
use gelf_shipper::record::{Extensions, FieldValue};
use gelf_shipper::store::FileKeyValueStore;
use mockito::Server;

use common::{refused_url, start_agent};

#[tokio::test]
async fn restart_reloads_records_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let url = refused_url();

    let agent = start_agent(&url, FileKeyValueStore::open(dir.path()).unwrap());
    for i in 0..20_i64 {
        let mut extensions = Extensions::new();
        extensions.insert("seq".to_string(), FieldValue::from(i));
        agent
            .log(format!("message {i}"), None, 1, extensions)
            .unwrap();
    }
    let before = agent.queue().flush().await.unwrap();
    agent.shutdown().await;

    let agent = start_agent(&url, FileKeyValueStore::open(dir.path()).unwrap());
    let after = agent.queue().flush().await.unwrap();
    assert_eq!(before, after);
    for (i, entry) in after.iter().enumerate() {
        assert_eq!(entry.record.short_message(), format!("message {i}"));
    }

    // New ids continue after the reloaded ones.
    agent.log("after restart", None, 1, Extensions::new()).unwrap();
    let all = agent.queue().flush().await.unwrap();
    assert_eq!(all.len(), 21);
    assert!(all[20].id > all[19].id);

    agent.shutdown().await;
}

#[tokio::test]
async fn delivered_records_stay_gone_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/gelf")
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let url = format!("{}/gelf", server.url());

    let agent = start_agent(&url, FileKeyValueStore::open(dir.path()).unwrap());
    agent.log("shipped", None, 1, Extensions::new()).unwrap();
    assert!(matches!(
        agent.flush_now().await,
        FlushOutcome::Delivered { .. }
    ));
    mock.assert_async().await;
    agent.shutdown().await;

    let agent = start_agent(&url, FileKeyValueStore::open(dir.path()).unwrap());
    assert_eq!(agent.queue().len().await.unwrap(), 0);
    agent.shutdown().await;
}

#[tokio::test]
async fn corrupt_store_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("LogEntries.json"), b"{not json").unwrap();

    let agent = start_agent(&refused_url(), FileKeyValueStore::open(dir.path()).unwrap());
    assert_eq!(agent.queue().len().await.unwrap(), 0);

    agent.log("fresh", None, 1, Extensions::new()).unwrap();
    assert_eq!(agent.queue().len().await.unwrap(), 1);
    agent.shutdown().await;
}
