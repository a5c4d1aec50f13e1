use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use offprint::config::Config;
use offprint::shell::Shell;

#[derive(Parser, Debug)]
#[command(name = "offprint")]
#[command(about = "Offline-first article reader core")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offprint/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Initial navigation hash, e.g. "#/section/research"
  #[arg(long, default_value = "#/")]
  hash: String,

  /// Override the state storage directory
  #[arg(long)]
  storage_dir: Option<PathBuf>,

  /// Append logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override storage directory if specified on the command line
  let config = if let Some(dir) = args.storage_dir {
    Config {
      storage_dir: Some(dir),
      ..config
    }
  } else {
    config
  };

  // Initialize and run the shell
  let mut shell = Shell::new(config, &args.hash).await?;
  shell.run().await?;

  Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
      let file = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let appender = tracing_appender::rolling::never(dir, file);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}
