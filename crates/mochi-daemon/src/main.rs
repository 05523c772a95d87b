mod config;
mod entity_directory;
mod node_identity;
mod peer_accept;
mod queue_sender;
mod schedule_dispatch;
mod server;
mod telemetry;
mod tls;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = telemetry::init("mochi-daemon")?;
    server::run().await
}
