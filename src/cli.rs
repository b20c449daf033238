//! Command-line interface for pcmcast
//!
//! Provides argument parsing using clap derive macros.

use crate::request::SynthesisMode;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Stream speech from a synthesis service to your speakers
#[derive(Parser, Debug)]
#[command(
    name = "pcmcast",
    version,
    about = "Stream speech from a synthesis service to your speakers"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Synthesis service base URL (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session events, -vv: per-chunk diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Options of `pcmcast say`
#[derive(clap::Args, Debug, Clone)]
pub struct SayArgs {
    /// Text to speak
    pub text: String,

    /// Synthesis mode
    #[arg(long, value_enum)]
    pub mode: Option<SynthesisMode>,

    /// Built-in speaker name (sft and instruct modes)
    #[arg(long, value_name = "NAME")]
    pub speaker: Option<String>,

    /// Cached voice id
    #[arg(long, value_name = "ID")]
    pub voice_id: Option<String>,

    /// Transcript of the reference clip
    #[arg(long, value_name = "TEXT")]
    pub prompt_text: Option<String>,

    /// Reference clip path on the service host
    #[arg(long, value_name = "PATH")]
    pub prompt_wav: Option<String>,

    /// Style instruction (instruct mode)
    #[arg(long, value_name = "TEXT")]
    pub instruct: Option<String>,

    /// Recording to convert (vc mode), path on the service host
    #[arg(long, value_name = "PATH")]
    pub source_wav: Option<String>,

    /// Speaking rate multiplier
    #[arg(long, value_name = "FACTOR")]
    pub speed: Option<f32>,

    /// Random seed for reproducible output
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Request one complete file instead of a live stream
    #[arg(long)]
    pub no_stream: bool,

    /// Read the whole stream before playing it
    #[arg(long)]
    pub buffered: bool,

    /// Write the generated audio to a WAV file
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Audio output device name
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize text and play it as it streams in
    Say(SayArgs),

    /// Check that the synthesis service is up
    Health,

    /// List cached voices on the service
    Voices,

    /// List built-in speakers on the service
    Speakers,

    /// List audio output devices
    Devices,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn say(cli: Cli) -> SayArgs {
        match cli.command {
            Commands::Say(args) => args,
            other => panic!("Expected Say command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_say_defaults() {
        let cli = Cli::try_parse_from(["pcmcast", "say", "hello world"]).unwrap();
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());

        let args = say(cli);
        assert_eq!(args.text, "hello world");
        assert!(args.mode.is_none());
        assert!(args.speed.is_none());
        assert!(!args.no_stream);
        assert!(!args.buffered);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_parse_say_all_options() {
        let cli = Cli::try_parse_from([
            "pcmcast",
            "say",
            "hi",
            "--mode",
            "zero-shot",
            "--voice-id",
            "alice",
            "--prompt-text",
            "reference",
            "--prompt-wav",
            "/srv/ref.wav",
            "--speed",
            "1.5",
            "--seed",
            "42",
            "--buffered",
            "-o",
            "out.wav",
            "--device",
            "pulse",
        ])
        .unwrap();

        let args = say(cli);
        assert_eq!(args.mode, Some(SynthesisMode::ZeroShot));
        assert_eq!(args.voice_id.as_deref(), Some("alice"));
        assert_eq!(args.prompt_text.as_deref(), Some("reference"));
        assert_eq!(args.prompt_wav.as_deref(), Some("/srv/ref.wav"));
        assert_eq!(args.speed, Some(1.5));
        assert_eq!(args.seed, Some(42));
        assert!(args.buffered);
        assert_eq!(args.output, Some(PathBuf::from("out.wav")));
        assert_eq!(args.device.as_deref(), Some("pulse"));
    }

    #[test]
    fn test_parse_say_requires_text() {
        assert!(Cli::try_parse_from(["pcmcast", "say"]).is_err());
    }

    #[test]
    fn test_parse_unknown_mode_fails() {
        assert!(Cli::try_parse_from(["pcmcast", "say", "hi", "--mode", "karaoke"]).is_err());
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["pcmcast", "-v", "-v", "health"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(["pcmcast", "health", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_global_server_and_quiet() {
        let cli =
            Cli::try_parse_from(["pcmcast", "voices", "--server", "http://gpu:8000", "-q"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.server.as_deref(), Some("http://gpu:8000"));
        assert!(matches!(cli.command, Commands::Voices));
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["pcmcast", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["pcmcast", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["pcmcast", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["pcmcast"]).is_err());
    }
}
