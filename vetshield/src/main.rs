use clap::Parser;
use tokio::time::sleep;
use tracing::info;

use vetshield::app_state::AppState;
use vetshield::http::setup_http_server;
use vetshield::init_telemetry::init_tracing;
use vetshield::settings::config::Settings;
use vetshield::tasks::sweeper::setup_sweeper;

#[derive(Parser)]
#[command(name = "vetshield")]
#[command(about = "Rate limited, abuse aware authentication API for the vet clinic platform")]
#[clap(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
enum Commands {
    /// Show current configuration and exit
    Config,
    /// Start the server (default)
    Run,
}

/// Load `.env.local` first, then `.env`. Existing variables win.
fn load_dotenv() {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_dotenv();

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Config => {
            let settings = Settings::new()?;
            println!("{:#?}", &settings);
            return Ok(());
        }
        Commands::Run => {}
    }

    init_tracing()?;

    let mut handles = vec![];

    let app_state = AppState::new().await?;

    {
        let handle =
            setup_http_server(app_state.clone(), &app_state.settings.api.bind_address).await?;
        handles.push(handle);
    }

    {
        let handle = setup_sweeper(app_state.clone()).await?;
        handles.push(handle);
    }

    sleep(std::time::Duration::from_millis(100)).await;

    loop {
        handles.retain(|handle| !handle.is_finished());

        if handles.is_empty() {
            info!("All tasks are done");
            break;
        }

        sleep(std::time::Duration::from_millis(200)).await;
    }

    Ok(())
}
