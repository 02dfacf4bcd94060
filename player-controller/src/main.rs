use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use player_controller::app::AppBuilder;
use player_controller::config::{AppConfig, ConfigManager};
use player_controller::types::{InputEvent, KeyInput, ProviderKind};

fn cli() -> Command {
    Command::new("player")
        .version("1.0")
        .about("Adaptive HLS playback controller driven from the terminal")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("URL")
                .help("Backend base URL, overrides the configuration file"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("Search token for the embedded provider"),
        )
        .arg(
            Arg::new("resource")
                .short('r')
                .long("resource")
                .value_name("KEY")
                .help("Poll and play a single transcoded resource")
                .conflicts_with("title"),
        )
        .arg(
            Arg::new("title")
                .short('t')
                .long("title")
                .value_name("KEY")
                .help("Open a title with episode continuity"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("NAME")
                .help("Display name used for the embedded provider search"),
        )
        .arg(
            Arg::new("provider")
                .short('p')
                .long("provider")
                .value_name("KIND")
                .help("Source provider: hls or embedded")
                .default_value("hls"),
        )
        .arg(
            Arg::new("episode")
                .short('e')
                .long("episode")
                .value_name("INDEX")
                .help("Episode index to start from")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
}

async fn load_config(matches: &ArgMatches) -> Result<AppConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let mut manager = ConfigManager::new(PathBuf::from(path));
            manager
                .load()
                .await
                .with_context(|| format!("loading configuration from {}", path))?;
            manager.get_config().clone()
        }
        None => AppConfig::default(),
    };

    if let Some(backend) = matches.get_one::<String>("backend") {
        config.backend.base_url = backend.clone();
    }
    if let Some(token) = matches.get_one::<String>("token") {
        config.backend.search_token = token.clone();
    }
    Ok(config)
}

fn key(name: &str) -> KeyInput {
    match name {
        "space" => KeyInput::new(" ").with_code("Space"),
        "left" => KeyInput::new("ArrowLeft"),
        "right" => KeyInput::new("ArrowRight"),
        "up" => KeyInput::new("ArrowUp"),
        "down" => KeyInput::new("ArrowDown"),
        other => KeyInput::new(other),
    }
}

/// Translate stdin lines into input events until `quit` or EOF
async fn read_console(inputs: mpsc::Sender<InputEvent>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let events = match command {
            "quit" | "q" => break,
            "dbl" => vec![InputEvent::DoubleClick],
            "hold" => {
                let millis = words.next().and_then(|w| w.parse().ok()).unwrap_or(2000);
                if inputs.send(InputEvent::KeyDown(key("space"))).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(millis)).await;
                vec![InputEvent::KeyUp(key("space"))]
            }
            "space" | "k" | "f" | "left" | "right" | "up" | "down" | "," | "." => {
                vec![
                    InputEvent::KeyDown(key(command)),
                    InputEvent::KeyUp(key(command)),
                ]
            }
            other => {
                println!("Unknown command: {}", other);
                continue;
            }
        };

        for event in events {
            if inputs.send(event).await.is_err() {
                return;
            }
        }
    }

    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches).await?;

    let mut view = AppBuilder::new()
        .with_config(config)
        .with_env_overrides(true)
        .build()
        .await?;

    if let Some(resource) = matches.get_one::<String>("resource") {
        view.play_resource(resource).await;
    } else if let Some(title_key) = matches.get_one::<String>("title") {
        let name = matches
            .get_one::<String>("name")
            .cloned()
            .unwrap_or_else(|| title_key.clone());
        let provider: ProviderKind = matches
            .get_one::<String>("provider")
            .map(String::as_str)
            .unwrap_or("hls")
            .parse()
            .map_err(anyhow::Error::msg)?;

        view.open_title(title_key, &name).await;
        view.select_provider(provider).await?;
        if provider == ProviderKind::DirectHls {
            let index = matches.get_one::<usize>("episode").copied().unwrap_or(0);
            if let Err(e) = view.select_episode(index).await {
                warn!("Could not start episode {}: {}", index, e);
            }
        }
    } else {
        bail!("either --resource or --title is required");
    }

    println!("Keys: space k f left right up down , . dbl | hold <ms> | quit");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(read_console(tx, cancel.clone()));

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            ctrl_c.cancel();
        }
    });

    view.run(rx, cancel).await;
    println!("Player stopped.");
    Ok(())
}
