//! # cbuild CLI Entry Point
//!
//! Parses arguments with clap, sets up logging and routes each subcommand to
//! the library. The process exit code reflects the build verdict:
//! `0` success or up to date, `1` usage/config error or failed pre script,
//! `2` compile failure, `3` link failure, `4` failed post script.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cbuild::build::{self, BuildOutcome};
use cbuild::compdb;
use cbuild::config::{
    BuildOptions, CONFIG_FILENAME, DEFAULT_PROFILE, DEFAULT_THREADS, PrintOptions, ProgressMode,
    ProjectConfig, ReportFilter, Settings,
};
use cbuild::export;
use cbuild::progress::ConsoleObserver;
use cbuild::resolver::PreprocessorResolver;
use cbuild::source;
use cbuild::templates;

#[derive(Parser)]
#[command(name = "cbuild")]
#[command(about = "Incremental C/C++ build orchestrator", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Project file
    #[arg(long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,
    /// Log change detection and scheduling decisions
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct PrintArgs {
    /// Hide reports of jobs that printed nothing
    #[arg(long)]
    skip_empty_reports: bool,
    /// Only show reports of failed jobs
    #[arg(long)]
    skip_warn_reports: bool,
    /// Never show job reports
    #[arg(long)]
    skip_all_reports: bool,
    /// Only list jobs once they finish
    #[arg(long)]
    skip_progress: bool,
    /// Hide job statuses entirely
    #[arg(long)]
    skip_statuses: bool,
    /// Disable colored output
    #[arg(long)]
    no_colors: bool,
}

impl PrintArgs {
    fn options(&self) -> PrintOptions {
        let reports = if self.skip_all_reports {
            ReportFilter::SkipAll
        } else if self.skip_warn_reports {
            ReportFilter::SkipWarnings
        } else if self.skip_empty_reports {
            ReportFilter::SkipEmpty
        } else {
            ReportFilter::ShowAll
        };
        let progress = if self.skip_statuses {
            ProgressMode::Hidden
        } else if self.skip_progress {
            ProgressMode::FinishedOnly
        } else {
            ProgressMode::Full
        };
        PrintOptions {
            reports,
            progress,
            colors: !self.no_colors,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile changed sources and link the executable
    Build {
        /// Profile to build
        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,
        /// Ignore stored fingerprints and rebuild everything
        #[arg(short = 'a', long = "all")]
        rebuild_all: bool,
        /// Maximum concurrent processes (-1 for unbounded)
        #[arg(
            short = 'n',
            long = "jobs",
            default_value_t = DEFAULT_THREADS,
            allow_negative_numbers = true
        )]
        jobs: i64,
        /// Also write compile_commands.json
        #[arg(long)]
        compile_commands: bool,
        #[command(flatten)]
        printing: PrintArgs,
    },
    /// Write a Makefile describing every profile
    Export,
    /// Create a starter cbuild.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Remove build intermediates
    Clean {
        /// Profile to clean
        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,
        /// Remove every profile and the executable
        #[arg(long)]
        all: bool,
    },
    /// List the profiles declared in the project file
    Profiles,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "cbuild=debug" } else { "cbuild=warn" })
    });
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn config_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn load_settings(config: &Path, opts: &BuildOptions) -> Result<Settings> {
    let project = ProjectConfig::load(config)?;
    Ok(project.resolve(&config_dir(config), opts)?)
}

fn print_summary(outcome: &BuildOutcome) {
    let Some(session) = &outcome.session else {
        return;
    };
    let failed = session.failed_jobs().count();
    let elapsed = format!("{:.2}s", session.elapsed.as_secs_f64());
    if session.verdict.is_success() {
        println!(
            "\n{} Built {} of {} sources in {}",
            "✓".green(),
            session.stale.len(),
            outcome.candidates.len(),
            elapsed
        );
    } else {
        println!(
            "\n{} Build failed ({} failed job{}) after {}",
            "x".red(),
            failed,
            if failed == 1 { "" } else { "s" },
            elapsed
        );
    }
}

fn run(cli: &Cli) -> Result<u8> {
    match &cli.command {
        Commands::Build {
            profile,
            rebuild_all,
            jobs,
            compile_commands,
            printing,
        } => {
            let printing = printing.options();
            if !printing.colors {
                colored::control::set_override(false);
                console::set_colors_enabled(false);
            }
            let opts = BuildOptions {
                profile: profile.clone(),
                threads: *jobs,
                rebuild_all: *rebuild_all,
                printing,
            };
            let settings = load_settings(&cli.config, &opts)?;
            tracing::debug!(?settings, "resolved settings");

            if *compile_commands {
                let path = compdb::write(&settings, &source::discover(&settings))?;
                println!("{} Wrote {}", "✓".green(), path.display());
            }

            let resolver = PreprocessorResolver::from_settings(&settings);
            let mut observer = ConsoleObserver::new(settings.printing);
            let outcome = build::build_project(&settings, &resolver, &mut observer)?;
            print_summary(&outcome);
            Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
        }

        Commands::Export => {
            let project = ProjectConfig::load(&cli.config)?;
            let opts = BuildOptions::default();
            let base = project.resolve(&config_dir(&cli.config), &opts)?;
            let resolver = PreprocessorResolver::from_settings(&base);
            let path = export::export(&project, &config_dir(&cli.config), &resolver, &opts)?;
            println!("{} Wrote {}", "✓".green(), path.display());
            Ok(0)
        }

        Commands::Init { force } => {
            templates::write_template(&cli.config, *force)?;
            println!("{} Created {}", "✓".green(), cli.config.display());
            Ok(0)
        }

        Commands::Clean { profile, all } => {
            let opts = BuildOptions {
                profile: profile.clone(),
                ..Default::default()
            };
            let settings = load_settings(&cli.config, &opts)?;
            build::clean(&settings, *all)?;
            Ok(0)
        }

        Commands::Profiles => {
            let project = ProjectConfig::load(&cli.config)?;
            let names = project.profile_names();
            if names.is_empty() {
                println!("{} No profiles declared; '{}' is implied", "!".yellow(), DEFAULT_PROFILE);
            }
            for name in names {
                let marker = if name == DEFAULT_PROFILE { "*" } else { " " };
                println!(" {} {}", marker.green(), name.bold());
            }
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
