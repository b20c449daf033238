use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use pcmcast::app::{init_logging, run_devices, run_health, run_say, run_speakers, run_voices};
use pcmcast::cli::{Cli, Commands, ConfigAction};
use pcmcast::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Say(args) => {
            let config = load_config(cli.config.as_deref(), cli.server)?;
            run_say(config, args, cli.quiet).await?;
        }
        Commands::Health => {
            let config = load_config(cli.config.as_deref(), cli.server)?;
            run_health(&config).await?;
        }
        Commands::Voices => {
            let config = load_config(cli.config.as_deref(), cli.server)?;
            run_voices(&config).await?;
        }
        Commands::Speakers => {
            let config = load_config(cli.config.as_deref(), cli.server)?;
            run_speakers(&config).await?;
        }
        Commands::Devices => {
            run_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref(), cli.server)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pcmcast",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order (later wins):
/// 1. Built-in defaults
/// 2. Config file (--config, or ~/.config/pcmcast/config.toml if present)
/// 3. Environment variables
/// 4. --server flag
fn load_config(custom_path: Option<&std::path::Path>, server: Option<String>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let mut config = config.with_env_overrides();
    if let Some(url) = server {
        config.server.url = url;
    }
    config.validate()?;
    Ok(config)
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
    server: Option<String>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path, server)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
