//! End-to-end pipeline tests: pasted imports, subscription refreshes and
//! source round-trips against in-memory collaborators.

use std::sync::Arc;

use sublink::codec::CodecRegistry;
use sublink::codec::base64::{decode_base64_text, encode_base64};
use sublink::error::IngestError;
use sublink::fingerprint::Fingerprinter;
use sublink::ingest::Ingestor;
use sublink::record::Payload;
use sublink::store::{MemoryFetcher, MemoryStore};
use sublink::subscription::SubscriptionSource;

fn setup() -> (Arc<MemoryStore>, Arc<MemoryFetcher>, Ingestor) {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MemoryFetcher::new());
    let ingestor = Ingestor::new(
        store.clone(),
        store.clone(),
        fetcher.clone(),
        CodecRegistry::with_builtin_codecs(),
        Fingerprinter::default(),
    );
    (store, fetcher, ingestor)
}

fn ss_uri(password: &str, name: &str) -> String {
    format!(
        "ss://{}@example.com:8388#{}",
        encode_base64(format!("aes-128-gcm:{}", password)),
        name
    )
}

#[tokio::test]
async fn import_counts_and_persists() {
    let (store, _, ingestor) = setup();

    let content = format!(
        "{}\n{}\nnot-a-link\n{}\n",
        ss_uri("one", "First"),
        ss_uri("two", "Second"),
        // same payload as the first line, different name
        ss_uri("one", "FirstAgain"),
    );

    let report = ingestor.import_text(&content).await.unwrap();
    assert_eq!(report.new_count, 2);
    assert_eq!(report.existing_count, 1);
    assert_eq!(report.error_count, 1);

    let records = store.records();
    assert_eq!(records.len(), 2);
    // newest first: both accepted candidates precede nothing
    assert_eq!(records[0].ps, "First");
    assert_eq!(records[1].ps, "Second");
}

#[tokio::test]
async fn import_is_idempotent() {
    let (store, _, ingestor) = setup();
    let content = ss_uri("pw", "Node");

    ingestor.import_text(&content).await.unwrap();
    let before = store.records();

    let report = ingestor.import_text(&content).await.unwrap();
    assert_eq!(report.new_count, 0);
    assert_eq!(report.existing_count, 1);
    assert_eq!(store.records(), before);
}

#[tokio::test]
async fn vmess_inline_without_query_decodes() {
    let (store, _, ingestor) = setup();

    let report = ingestor
        .import_text("vmess://b831381d-6324-4d53-ad4f-8cda48b30811@example.com:443#VMessTCPAuto")
        .await
        .unwrap();
    assert_eq!(report.new_count, 1);

    let records = store.records();
    assert_eq!(records[0].ps, "VMessTCPAuto");
    let Payload::Vmess(p) = &records[0].payload else {
        panic!("expected vmess");
    };
    assert_eq!(p.net, "raw");
    assert_eq!(p.scy, "auto");
}

#[tokio::test]
async fn long_names_are_truncated() {
    let (store, _, ingestor) = setup();
    let name = "n".repeat(80);

    ingestor.import_text(&ss_uri("pw", &name)).await.unwrap();
    assert_eq!(store.records()[0].ps.chars().count(), 50);
}

#[tokio::test]
async fn persistence_failure_keeps_old_list() {
    let (store, _, ingestor) = setup();
    ingestor.import_text(&ss_uri("pw", "Kept")).await.unwrap();

    store.set_fail_writes(true);
    let err = ingestor
        .import_text(&ss_uri("other", "Lost"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Persistence(_)));

    store.set_fail_writes(false);
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ps, "Kept");
}

#[tokio::test]
async fn html_source_refresh_scrapes_links() {
    let (store, fetcher, ingestor) = setup();

    let link = format!(
        "vmess://uuid@html.example:443?net=ws&amp;path=%2Fws&amp;host={}#Scraped",
        "h".repeat(40)
    );
    fetcher.stub(
        "https://page.example/",
        &format!("<html><body><p>{link}</p><p>{link}</p></body></html>"),
    );

    let source = SubscriptionSource {
        name: "Page".to_string(),
        url: "https://page.example/".to_string(),
        is_html: true,
        ..Default::default()
    };

    let report = ingestor.refresh_source(&source).await.unwrap();
    assert_eq!(report.new_count, 1);

    let records = store.records();
    assert_eq!(records[0].ps, "Scraped");
    let Payload::Vmess(p) = &records[0].payload else {
        panic!("expected vmess");
    };
    assert_eq!(p.path, "/ws");
}

#[tokio::test]
async fn json_feed_refresh() {
    let (store, fetcher, ingestor) = setup();

    fetcher.stub(
        "https://feed.example/sub",
        r#"{"servers": [
            {"type": "trojan", "name": "Feed", "server": "t.example", "port": 443,
             "password": "pw", "network": "ws",
             "host": "cdn.example", "path": "/t"}
        ]}"#,
    );

    let source = SubscriptionSource {
        name: "Feed".to_string(),
        url: "https://feed.example/sub".to_string(),
        ..Default::default()
    };

    let report = ingestor.refresh_source(&source).await.unwrap();
    assert_eq!(report.new_count, 1);
    let records = store.records();
    assert_eq!(records[0].ps, "Feed");
    assert_eq!(records[0].scy, "tls+ws");
}

#[tokio::test]
async fn feed_and_pasted_uri_deduplicate() {
    let (store, fetcher, ingestor) = setup();

    ingestor
        .import_text("vmess://u-u-i-d@example.com:443#Pasted")
        .await
        .unwrap();

    fetcher.stub(
        "https://feed.example/sub",
        r#"{"servers": [
            {"type": "vmess", "name": "FromFeed", "server": "example.com",
             "port": 443, "uuid": "u-u-i-d"}
        ]}"#,
    );
    let source = SubscriptionSource {
        name: "Feed".to_string(),
        url: "https://feed.example/sub".to_string(),
        ..Default::default()
    };
    let report = ingestor.refresh_source(&source).await.unwrap();

    // same server over both routes collapses to one record
    assert_eq!(report.new_count, 0);
    assert_eq!(report.existing_count, 1);
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ps, "Pasted");
}

#[tokio::test]
async fn feed_without_servers_is_noop() {
    let (store, fetcher, ingestor) = setup();
    fetcher.stub("https://feed.example/sub", r#"{"version": 2}"#);

    let source = SubscriptionSource {
        url: "https://feed.example/sub".to_string(),
        ..Default::default()
    };

    let report = ingestor.refresh_source(&source).await.unwrap();
    assert_eq!(report.new_count, 0);
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn batch_refresh_survives_failing_source() {
    let (store, fetcher, ingestor) = setup();

    fetcher.stub(
        "https://good.example/sub",
        &format!(r#"<html>{}</html>"#, ss_uri(&"p".repeat(70), "FromGood")),
    );

    store.set_sources(vec![
        SubscriptionSource {
            name: "Broken".to_string(),
            url: "https://down.example/sub".to_string(),
            ..Default::default()
        },
        SubscriptionSource {
            name: "Good".to_string(),
            url: "https://good.example/sub".to_string(),
            is_html: true,
            ..Default::default()
        },
    ]);

    let summary = ingestor.refresh_all(false).await.unwrap();
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.sources_ok, 1);
    assert_eq!(summary.report.new_count, 1);
    assert_eq!(store.records()[0].ps, "FromGood");
}

#[tokio::test]
async fn auto_only_skips_manual_sources() {
    let (store, fetcher, ingestor) = setup();
    fetcher.stub("https://manual.example/", "{}");

    store.set_sources(vec![SubscriptionSource {
        name: "Manual".to_string(),
        url: "https://manual.example/".to_string(),
        auto_update: false,
        ..Default::default()
    }]);

    let summary = ingestor.refresh_all(true).await.unwrap();
    assert_eq!(summary.sources_ok + summary.sources_failed, 0);
}

#[tokio::test]
async fn export_bundle_round_trips_as_existing() {
    let (_, _, ingestor) = setup();
    ingestor
        .import_text(&format!("{}\n{}", ss_uri("a", "A"), ss_uri("b", "B")))
        .await
        .unwrap();

    let bundle = ingestor.export_records(false, true).await.unwrap();
    let text = decode_base64_text(&bundle).unwrap();
    assert_eq!(text.lines().count(), 2);

    let report = ingestor.import_text(&text).await.unwrap();
    assert_eq!(report.new_count, 0);
    assert_eq!(report.existing_count, 2);
}

#[tokio::test]
async fn legacy_export_reimports_as_existing() {
    let (_, _, ingestor) = setup();
    ingestor
        .import_text("vmess://uuid@example.com:443?net=ws&path=%2Fws#Node")
        .await
        .unwrap();

    let legacy = ingestor.export_records(true, false).await.unwrap();
    assert!(legacy.starts_with("vmess://"));

    let report = ingestor.import_text(&legacy).await.unwrap();
    assert_eq!(report.new_count, 0);
    assert_eq!(report.existing_count, 1);
}

#[tokio::test]
async fn source_export_import_round_trip() {
    let (store, _, ingestor) = setup();

    let source = SubscriptionSource {
        name: "Mine".to_string(),
        url: "https://example.com/sub".to_string(),
        auto_update: true,
        ..Default::default()
    };
    ingestor.put_source(source, None).await.unwrap();

    let exported = ingestor.export_sources().await.unwrap();
    assert!(exported.starts_with("doaySub://"));

    // re-import into the same list: everything already there
    let report = ingestor.import_sources_text(&exported).await.unwrap();
    assert_eq!(report.ok_count, 0);
    assert_eq!(report.existing_count, 1);

    // import into a fresh list
    store.set_sources(Vec::new());
    let report = ingestor.import_sources_text(&exported).await.unwrap();
    assert_eq!(report.ok_count, 1);
    let sources = store.sources();
    assert_eq!(sources[0].name, "Mine");
    assert!(sources[0].auto_update);
    assert!(!sources[0].hash.is_empty());
}
