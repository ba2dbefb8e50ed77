//! Ingest and Replay Example
//!
//! Writes two channels of a sequence through the pooled multi-lane writer,
//! then replays them as one time-ordered stream.
//!
//! Run with:
//! ```bash
//! RUST_LOG=seqflow_client=debug cargo run --package seqflow-client --example ingest_and_replay
//! ```

use seqflow_client::{
    Client, FieldType, InMemoryServer, Message, Metadata, Payload, PayloadSchema, TimeWindow,
    WriterOptions,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("\nSeqflow Ingest and Replay");
    println!("=========================\n");

    let server = InMemoryServer::new();
    let client = Client::builder()
        .connector(server.connector())
        .pool_size(2)
        .max_batch_size_records(50)
        .connect()
        .await?;

    let imu_schema = PayloadSchema::builder("imu")
        .field("acc_x", FieldType::Float64)
        .field("acc_y", FieldType::Float64)
        .build()?;
    let gps_schema = PayloadSchema::builder("gps")
        .field("lat", FieldType::Float64)
        .field("lon", FieldType::Float64)
        .nullable_field("fix", FieldType::Utf8)
        .build()?;

    // Step 1: ingest
    println!("Step 1: writing sequence 'drive_01'");
    let writer = client
        .create_sequence("drive_01", Metadata::new(), WriterOptions::default())
        .await?;

    writer
        .run(|w| async move {
            let imu = w
                .create_channel("/front//imu", imu_schema, Metadata::new())
                .await?;
            let gps = w.create_channel("gps", gps_schema, Metadata::new()).await?;

            for i in 0..200i64 {
                let ts = 1_000_000 + i * 10_000;
                imu.push(Message::at(
                    ts,
                    Payload::new()
                        .with("acc_x", (i as f64) * 0.01)
                        .with("acc_y", -(i as f64) * 0.01),
                ))
                .await?;

                if i % 20 == 0 {
                    gps.push(Message::at(
                        ts + 5_000,
                        Payload::new()
                            .with("lat", 45.0 + (i as f64) * 1e-5)
                            .with("lon", 9.0)
                            .with("fix", "3d"),
                    ))
                    .await?;
                }
            }
            Ok(())
        })
        .await?;
    println!("   channels: {:?}\n", client.sequence_channels("drive_01").await);

    // Step 2: replay
    println!("Step 2: replaying merged stream");
    let mut reader = client
        .open_sequence_stream("drive_01", None, TimeWindow::new(Some(1_000_000), Some(1_200_000)))
        .await?;

    let mut count = 0usize;
    while let Some((channel, message)) = reader.next().await? {
        if channel == "gps" {
            println!("   {} gps lat={:?}", message.timestamp_ns, message.payload.get("lat"));
        }
        count += 1;
    }
    reader.close();
    println!("   {count} rows replayed in timestamp order\n");

    client.close().await?;
    Ok(())
}
