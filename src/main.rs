//! SPL compiler CLI
//!
//! `splc -i <path> [-t x64|ssm] [-o <path>] [-v debug|info|warning|error]`

use clap::Parser as ClapParser;
use splc::config::{CompilerConfig, ConfigFile, Target, Verbosity};
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "splc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SPL compiler - compile .spl programs to SSM or x86-64", long_about = None)]
struct Cli {
    /// Input .spl source file
    #[arg(short, long)]
    input: PathBuf,

    /// Target backend
    #[arg(short, long, value_enum)]
    target: Option<Target>,

    /// Output path (defaults to ./out)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Logging verbosity
    #[arg(short, long, value_enum)]
    verbosity: Option<Verbosity>,

    /// Keep the intermediate .asm and .o files
    #[arg(long)]
    keep_asm: bool,

    /// Configuration file (defaults to ./splc.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> CompilerConfig {
    let mut config = CompilerConfig::default();

    let config_path = cli
        .config
        .clone()
        .or_else(|| PathBuf::from("splc.toml").exists().then(|| "splc.toml".into()));
    if let Some(path) = config_path {
        match fs::read_to_string(&path) {
            Ok(content) => match ConfigFile::from_toml(&content) {
                Ok(file) => config = config.merge_file(file),
                Err(e) => {
                    eprintln!("Error in {}: {}", path.display(), e);
                    process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    // command-line flags take precedence over the config file
    if let Some(target) = cli.target {
        config.target = target;
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(verbosity) = cli.verbosity {
        config.verbosity = verbosity;
    }
    if cli.keep_asm {
        config.keep_asm = true;
    }
    config
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.verbosity.filter()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match splc::compile_file(&cli.input, &config) {
        Ok(()) => {
            println!(
                "Compilation of {} to {} succeeded",
                cli.input.display(),
                config.output.display()
            );
        }
        Err(errors) => {
            let source = fs::read_to_string(&cli.input).unwrap_or_default();
            for error in &errors {
                eprintln!("{}", error.render(&source));
            }
            process::exit(1);
        }
    }
}
