use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use harbor_lister::app::{App, ListResult, RunOptions};
use harbor_lister::config::{CliOverrides, ConfigLoader};
use harbor_lister::error::ListerError;
use harbor_lister::fs_util;
use harbor_lister::harbor::HarborHttpClient;
use harbor_lister::output::{JsonOutput, OutputMode};
use harbor_lister::tui::Tui;

#[derive(Parser)]
#[command(name = "harbor-lister")]
#[command(about = "List every project, repository and tag on a Harbor registry into an Excel workbook")]
#[command(version, author)]
struct Cli {
    /// Harbor server address, e.g. harbor.example.com
    #[arg(short = 'u', long, env = "HARBOR_URL")]
    url: Option<String>,

    #[arg(short = 'U', long, env = "HARBOR_USERNAME")]
    username: Option<String>,

    #[arg(short = 'P', long, env = "HARBOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Workbook path [default: harbor_images.xlsx]
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Skip TLS certificate verification [default: true]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    insecure_ssl: Option<bool>,

    /// Projects listed in parallel [default: 50]
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Items requested per API page, 1-100 [default: 100]
    #[arg(long)]
    page_size: Option<u32>,

    /// Per-request timeout in seconds [default: 60]
    #[arg(long = "timeout", value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Offset used to display push times [default: +08:00]
    #[arg(long, value_name = "+HH:MM")]
    utc_offset: Option<String>,

    /// JSON config file [default: ./harbor-lister.json, then the user config dir]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON instead of showing the dashboard
    #[arg(long)]
    non_interactive: bool,

    /// Log at debug level in non-interactive runs when RUST_LOG is unset
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            output: self.output.clone(),
            insecure_ssl: self.insecure_ssl,
            concurrency: self.concurrency,
            page_size: self.page_size,
            timeout_secs: self.timeout_secs,
            utc_offset: self.utc_offset.clone(),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ListerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ListerError) -> u8 {
    match error {
        ListerError::MissingField(_)
        | ListerError::InvalidUrl(_)
        | ListerError::InvalidSetting { .. }
        | ListerError::ConfigRead(_)
        | ListerError::ConfigParse(_) => 2,
        ListerError::HarborHttp(_)
        | ListerError::HarborStatus { .. }
        | ListerError::Decode(_)
        | ListerError::InvalidVersion(_)
        | ListerError::UnsupportedVersion(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let output_mode = if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(output_mode, cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::resolve(cli.overrides())?;
    tracing::debug!(?config, "configuration resolved");
    fs_util::ensure_parent_dir(&config.output)?;

    let client = HarborHttpClient::new(&config)?;
    let app = App::new(client);
    let options = RunOptions::from(&config);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&options, &JsonOutput)?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(&config.harbor_url);
            let result = tui.run(move |sink| app.run(&options, sink))?;
            print_summary(&result);
            Ok(())
        }
    }
}

/// Level used when RUST_LOG is unset. The dashboard owns the terminal, so only
/// errors reach stderr while it is drawn.
fn default_log_level(mode: OutputMode, verbose: bool) -> &'static str {
    match (mode, verbose) {
        (OutputMode::Interactive, _) => "error",
        (OutputMode::NonInteractive, true) => "debug",
        (OutputMode::NonInteractive, false) => "warn",
    }
}

fn print_summary(result: &ListResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}harbor-lister summary (Harbor {}){reset}", result.harbor_version);
    for project in &result.projects {
        println!(
            "{green}  {}: {} repositories, {} artifacts, {} tags{reset}",
            project.name, project.repositories, project.artifacts, project.tags
        );
    }
    for name in &result.empty_projects {
        println!("{red}  {name}: 0 repositories{reset}");
    }
    for item in &result.skipped {
        println!("{yellow}  skipped {}: {}{reset}", item.name, item.reason);
    }
    println!(
        "{cyan}{} projects, {} repositories, {} tags written to {}{reset}",
        result.totals.projects, result.totals.repositories, result.totals.tags, result.output
    );
}
