//! Read-path integration tests: merge order, windows, modes.

use seqflow_client::{
    Client, ClientError, FieldType, InMemoryServer, Message, Metadata, Payload, PayloadSchema,
    TimeWindow, Value, WriterOptions,
};

fn int_schema() -> PayloadSchema {
    PayloadSchema::builder("int64")
        .field("data", FieldType::Int64)
        .build()
        .unwrap()
}

fn sample(ts: i64) -> Message {
    Message::at(ts, Payload::new().with("data", ts))
}

/// Writes one finalized sequence with the given channels and timestamps.
async fn seeded(server: &InMemoryServer, sequence: &str, channels: &[(&str, &[i64])]) -> Client {
    let client = Client::builder()
        .connector(server.connector())
        .pool_size(2)
        .max_batch_size_records(2)
        .connect()
        .await
        .unwrap();

    let channels: Vec<(String, Vec<i64>)> = channels
        .iter()
        .map(|(name, ts)| (name.to_string(), ts.to_vec()))
        .collect();
    client
        .create_sequence(sequence, Metadata::new(), WriterOptions::default())
        .await
        .unwrap()
        .run(|w| async move {
            for (name, timestamps) in channels {
                let ch = w.create_channel(&name, int_schema(), Metadata::new()).await?;
                for ts in timestamps {
                    ch.push(sample(ts)).await?;
                }
            }
            Ok(())
        })
        .await
        .unwrap();
    client
}

async fn drain(reader: &mut seqflow_client::SequenceReader) -> Vec<(String, i64)> {
    let mut out = Vec::new();
    while let Some((channel, message)) = reader.next().await.unwrap() {
        out.push((channel, message.timestamp_ns));
    }
    out
}

fn pairs(expected: &[(&str, i64)]) -> Vec<(String, i64)> {
    expected.iter().map(|(c, t)| (c.to_string(), *t)).collect()
}

// ============================================================================
// Merge
// ============================================================================

#[tokio::test]
async fn test_merge_interleaves_by_timestamp() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "merge", &[("a", &[100, 300]), ("b", &[200, 400])]).await;

    let mut reader = client
        .open_sequence_stream("merge", None, TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(reader.channel_names(), vec!["a", "b"]);

    assert_eq!(reader.next_timestamp().await.unwrap(), Some(100));
    // Peeking twice does not advance.
    assert_eq!(reader.next_timestamp().await.unwrap(), Some(100));

    assert_eq!(
        drain(&mut reader).await,
        pairs(&[("a", 100), ("b", 200), ("a", 300), ("b", 400)])
    );
    assert_eq!(reader.next_timestamp().await.unwrap(), None);
    assert!(reader.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_ties_go_to_first_channel() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "ties", &[("a", &[10, 20]), ("b", &[10, 20])]).await;

    let mut reader = client
        .open_sequence_stream("ties", None, TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(
        drain(&mut reader).await,
        pairs(&[("a", 10), ("b", 10), ("a", 20), ("b", 20)])
    );
}

#[tokio::test]
async fn test_merge_many_channels_is_ordered() {
    let server = InMemoryServer::new();
    let a: Vec<i64> = (0..50).map(|i| i * 3).collect();
    let b: Vec<i64> = (0..40).map(|i| i * 5 + 1).collect();
    let c: Vec<i64> = (0..30).map(|i| i * 7 + 2).collect();
    let client = seeded(&server, "many", &[("a", &a[..]), ("b", &b[..]), ("c", &c[..])]).await;

    let mut reader = client
        .open_sequence_stream("many", None, TimeWindow::unbounded())
        .await
        .unwrap();
    let rows = drain(&mut reader).await;

    assert_eq!(rows.len(), 120);
    assert!(rows.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(rows.iter().filter(|(c, _)| c == "b").count(), 40);
}

#[tokio::test]
async fn test_window_and_channel_selection() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "window", &[("a", &[100, 300]), ("b", &[200, 400])]).await;

    let mut windowed = client
        .open_sequence_stream("window", None, TimeWindow::new(Some(200), Some(400)))
        .await
        .unwrap();
    assert_eq!(drain(&mut windowed).await, pairs(&[("b", 200), ("a", 300)]));

    let mut only_b = client
        .open_sequence_stream("window", Some(&["b"][..]), TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(only_b.channel_names(), vec!["b"]);
    assert_eq!(drain(&mut only_b).await, pairs(&[("b", 200), ("b", 400)]));

    let empty: &[&str] = &[];
    let mut everything = client
        .open_sequence_stream("window", Some(empty), TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(everything.channel_names(), vec!["a", "b"]);
    assert_eq!(drain(&mut everything).await.len(), 4);
}

#[tokio::test]
async fn test_empty_channels_are_skipped() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "sparse", &[("empty", &[]), ("full", &[5])]).await;

    let mut reader = client
        .open_sequence_stream("sparse", None, TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(reader.channel_names(), vec!["full"]);
    assert_eq!(drain(&mut reader).await, pairs(&[("full", 5)]));

    let nothing = client
        .open_sequence_stream("sparse", Some(&["empty"][..]), TimeWindow::unbounded())
        .await;
    assert!(matches!(nothing, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn test_missing_sequence() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "present", &[("a", &[1])]).await;
    assert!(client
        .open_sequence_stream("absent", None, TimeWindow::unbounded())
        .await
        .is_err());
}

// ============================================================================
// Modes
// ============================================================================

#[tokio::test]
async fn test_batch_provider_before_iteration() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "batches", &[("a", &[1, 2, 3]), ("b", &[4])]).await;

    let mut reader = client
        .open_sequence_stream("batches", None, TimeWindow::unbounded())
        .await
        .unwrap();
    let mut rows = 0;
    for channel in reader.as_batch_provider().unwrap() {
        while let Some(batch) = channel.fetch_next_batch().await.unwrap() {
            rows += batch.num_rows();
        }
    }
    assert_eq!(rows, 4);
}

#[tokio::test]
async fn test_batch_provider_rejected_after_iteration() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "modes", &[("a", &[1, 2])]).await;

    let mut reader = client
        .open_sequence_stream("modes", None, TimeWindow::unbounded())
        .await
        .unwrap();
    reader.next_timestamp().await.unwrap();
    assert!(matches!(
        reader.as_batch_provider(),
        Err(ClientError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_closed_reader_rejects_reads() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "closed", &[("a", &[1])]).await;

    let mut reader = client
        .open_sequence_stream("closed", None, TimeWindow::unbounded())
        .await
        .unwrap();
    reader.close();
    reader.close();
    assert!(matches!(reader.next().await, Err(ClientError::InvalidState(_))));
}

// ============================================================================
// Channel streams
// ============================================================================

#[tokio::test]
async fn test_channel_stream() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "single", &[("imu", &[7, 8, 9])]).await;

    let mut reader = client
        .open_channel_stream("single", "/imu", TimeWindow::unbounded())
        .await
        .unwrap();
    assert_eq!(reader.name(), "imu");
    assert_eq!(reader.ontology_tag(), "int64");
    assert_eq!(reader.next_timestamp().await.unwrap(), Some(7));

    let first = reader.next().await.unwrap().unwrap();
    assert_eq!(first.payload.get("data"), Some(&Value::Int(7)));
    assert!(matches!(
        reader.fetch_next_batch().await,
        Err(ClientError::InvalidState(_))
    ));

    assert_eq!(reader.next().await.unwrap().unwrap().timestamp_ns, 8);
    assert_eq!(reader.next().await.unwrap().unwrap().timestamp_ns, 9);
    assert!(reader.next().await.unwrap().is_none());
    assert_eq!(reader.next_timestamp().await.unwrap(), None);

    assert!(matches!(
        client
            .open_channel_stream("single", "gps", TimeWindow::unbounded())
            .await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_payload_round_trip() {
    let server = InMemoryServer::new();
    let client = Client::builder()
        .connector(server.connector())
        .pool_size(1)
        .connect()
        .await
        .unwrap();

    let schema = PayloadSchema::builder("gps")
        .field("lat", FieldType::Float64)
        .field("valid", FieldType::Bool)
        .nullable_field("fix", FieldType::Utf8)
        .build()
        .unwrap();

    client
        .create_sequence("trip", Metadata::new(), WriterOptions::default())
        .await
        .unwrap()
        .run(|w| async move {
            let gps = w.create_channel("gps", schema, Metadata::new()).await?;
            gps.push(Message::at(
                1,
                Payload::new()
                    .with("lat", 45.5)
                    .with("valid", true)
                    .with("fix", "3d"),
            ))
            .await?;
            gps.push(Message::at(
                2,
                Payload::new().with("lat", 45.6).with("valid", false),
            ))
            .await?;
            Ok(())
        })
        .await
        .unwrap();

    let mut reader = client
        .open_channel_stream("trip", "gps", TimeWindow::unbounded())
        .await
        .unwrap();
    let first = reader.next().await.unwrap().unwrap();
    assert_eq!(first.payload.get("lat"), Some(&Value::Float(45.5)));
    assert_eq!(first.payload.get("valid"), Some(&Value::Bool(true)));
    assert_eq!(first.payload.get("fix"), Some(&Value::Str("3d".to_string())));
    assert_eq!(first.payload.header_stamp_ns, Some(1));

    let second = reader.next().await.unwrap().unwrap();
    assert_eq!(second.timestamp_ns, 2);
    assert_eq!(second.payload.get("fix"), None);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_catalog_reads_back_metadata_and_bounds() {
    let server = InMemoryServer::new();
    let client = Client::builder()
        .connector(server.connector())
        .pool_size(1)
        .max_batch_size_records(2)
        .connect()
        .await
        .unwrap();

    let mut sequence_meta = Metadata::new();
    sequence_meta.insert("vehicle".to_string(), serde_json::Value::from("car_7"));
    let mut channel_meta = Metadata::new();
    channel_meta.insert("rate_hz".to_string(), serde_json::Value::from(100));

    let catalog = &client;
    let imu_meta = channel_meta.clone();
    client
        .create_sequence("drive", sequence_meta.clone(), WriterOptions::default())
        .await
        .unwrap()
        .run(|w| async move {
            let imu = w.create_channel("imu", int_schema(), imu_meta).await?;
            w.create_channel("idle", int_schema(), Metadata::new()).await?;
            for ts in [100, 200, 300] {
                imu.push(sample(ts)).await?;
            }
            let pending = catalog.sequence_info("drive").await.unwrap();
            assert!(!pending.is_locked);
            Ok(())
        })
        .await
        .unwrap();

    let sequence = client.sequence_info("drive").await.unwrap();
    assert_eq!(sequence.name, "drive");
    assert_eq!(sequence.channels, vec!["imu", "idle"]);
    assert_eq!(sequence.user_metadata, sequence_meta);
    assert!(sequence.is_locked);
    assert!(sequence.total_size_bytes > 0);
    assert!(sequence.created_at_ms > 0);
    assert_eq!(sequence.timestamp_ns_min, Some(100));
    assert_eq!(sequence.timestamp_ns_max, Some(300));

    let imu = client.channel_info("drive", "/imu").await.unwrap();
    assert_eq!(imu.sequence_name, "drive");
    assert_eq!(imu.name, "imu");
    assert_eq!(imu.ontology_tag.as_deref(), Some("int64"));
    assert_eq!(imu.user_metadata, channel_meta);
    assert_eq!(imu.chunks_number, Some(2));
    assert_eq!(imu.total_size_bytes, sequence.total_size_bytes);
    assert_eq!(imu.timestamp_ns_min, Some(100));
    assert_eq!(imu.timestamp_ns_max, Some(300));

    let idle = client.channel_info("drive", "idle").await.unwrap();
    assert_eq!(idle.chunks_number, Some(0));
    assert_eq!(idle.total_size_bytes, 0);
    assert_eq!(idle.timestamp_ns_min, None);
}

#[tokio::test]
async fn test_catalog_misses_degrade_to_none() {
    let server = InMemoryServer::new();
    let client = seeded(&server, "known", &[("a", &[1])]).await;

    assert!(client.sequence_info("unknown").await.is_none());
    assert!(client.channel_info("known", "b").await.is_none());
    assert!(client.channel_info("known", "bad name!").await.is_none());

    server.fail_action(seqflow_client::FlightAction::SequenceSystemInfo);
    assert!(client.sequence_info("known").await.is_none());
    server.clear_faults();
    assert!(client.sequence_info("known").await.is_some());

    client.close().await.unwrap();
    assert!(client.sequence_info("known").await.is_none());
}
