use std::io;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use avl_engine::shell::Shell;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "avl-menu")]
#[command(bin_name = "avl-menu")]
#[command(about = "Interactive menu over an AVL tree of integer keys", long_about = None)]
struct MenuCli {
    /// Log level of the messages written to stderr
    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Print neither the menu nor the prompts
    #[arg(short, long)]
    quiet: bool,

    /// Keys inserted before the menu starts
    #[arg(allow_negative_numbers = true)]
    keys: Vec<i32>,
}

fn main() -> anyhow::Result<()> {
    let cli = MenuCli::parse();

    let level = LevelFilter::from(cli.log_level);
    if level != LevelFilter::Off {
        // Stderr only, stdout belongs to the menu
        TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
            .context("Failed to initialize logging")?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut shell = Shell::new(stdin.lock(), stdout.lock(), cli.quiet);
    for key in cli.keys {
        shell
            .tree_mut()
            .insert(key)
            .with_context(|| format!("Failed to insert initial key {key}"))?;
    }
    shell.run()?;
    Ok(())
}
