use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use player_controller::mock_server::MockBackend;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 解析命令行参数
    let matches = Command::new("Mock Media Backend")
        .version("1.0")
        .about("Mock transcoding, HLS, episode and search endpoints for the player")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("Listening address")
                .default_value("127.0.0.1:8080"),
        )
        .arg(
            Arg::new("token")
                .short('t')
                .long("token")
                .value_name("TOKEN")
                .help("Token required by the search endpoint")
                .default_value("demo-token"),
        )
        .arg(
            Arg::new("step")
                .short('s')
                .long("step")
                .value_name("PERCENT")
                .help("Transcoding progress added per status probe")
                .value_parser(clap::value_parser!(i32))
                .default_value("15"),
        )
        .get_matches();

    let bind = matches
        .get_one::<String>("bind")
        .map(String::as_str)
        .unwrap_or("127.0.0.1:8080");
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", bind))?;
    let token = matches
        .get_one::<String>("token")
        .map(String::as_str)
        .unwrap_or("demo-token");
    let step = matches.get_one::<i32>("step").copied().unwrap_or(15);

    let backend = MockBackend::demo(token, step);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    info!("Demo resources: demo, demo-ready, demo-broken; title: demo-show");
    backend.serve(listener).await?;
    Ok(())
}
