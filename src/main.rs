use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::sync::mpsc;
use sqlite_backup_manager::backup::Scheduler;
use sqlite_backup_manager::config::Config;
use sqlite_backup_manager::sink::{drain, LogSink};

/// Periodic online backups of a live SQLite database
#[derive(Parser, Debug)]
#[command(name = "sqlite-backup-manager")]
#[command(about = "Periodic online backups of a live SQLite database")]
#[command(version)]
struct Cli {
    /// Config directory, defaults to ~/.tblbk
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Write a default config.toml into the config directory
    Init,
    /// Back up DATABASE on the configured schedule until SIGINT or SIGTERM
    Daemon {
        /// Path of the live database
        database: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config_dir(cli.dir)?.join("config.toml");

    match cli.command {
        Command::Init => {
            Config::default().save(&config_path).await?;
            info!("config written to {}", config_path.display());
            Ok(())
        }
        Command::Daemon { database } => {
            let config = Config::new(&config_path).await?;
            daemon(config, database).await
        }
    }
}

async fn daemon(config: Config, database: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel(1);
    let scheduler = Arc::new(
        Scheduler::new(config.backuper.frequency, tx, config.backuper_options(&database)).await?,
    );

    let runner = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });
    let sink = tokio::spawn(async move { drain(rx, &LogSink).await });

    wait_for_signal().await?;
    scheduler.shutdown();
    if let Err(e) = runner.await {
        error!("scheduler task: {}", e);
    }
    // dropping the last sender lets the sink finish
    drop(scheduler);
    if let Err(e) = sink.await {
        error!("sink task: {}", e);
    }
    Ok(())
}

fn config_dir(dir: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(dir) = dir {
        return Ok(dir);
    }
    let home = dirs::home_dir().ok_or("Cannot determine home directory")?;
    Ok(home.join(".tblbk"))
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), std::io::Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    info!("shutdown signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), std::io::Error> {
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
