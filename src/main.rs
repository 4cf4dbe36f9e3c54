// Entry point and high-level CLI flow.
//
// With a subcommand the binary loads the ledger, applies the filter flags,
// prints the requested report and exits. Without one it runs the interactive
// menu: load the file, generate reports, adjust filters and export.
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use adsales_report::abc::AbcMetric;
use adsales_report::cohort::MatrixMetric;
use adsales_report::output::{export_bundle, preview_sheet, Sheet};
use adsales_report::ranking::RankCriterion;
use adsales_report::reports;
use adsales_report::util::{format_int, normalize_text};
use adsales_report::variance::GroupKey;
use adsales_report::{
    FilterSelection, PipelineRequest, ReportBundle, ReportConfig, ReportError, Result, Session,
};

const PREVIEW_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "adsales-report")]
#[command(about = "Cohort, variance and ABC reports for an advertising sales ledger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger CSV (overrides the configuration)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for exports (overrides the configuration)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[command(flatten)]
    filters: FilterArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// First year to include
    #[arg(long)]
    year_from: Option<i32>,

    /// Last year to include
    #[arg(long)]
    year_to: Option<i32>,

    /// Month to include (repeatable)
    #[arg(long = "month", value_parser = clap::value_parser!(u32).range(1..=12))]
    months: Vec<u32>,

    /// Issuer to include (repeatable)
    #[arg(long = "issuer")]
    issuers: Vec<String>,

    /// Executive to include (repeatable)
    #[arg(long = "executive")]
    executives: Vec<String>,

    /// Client to include (repeatable)
    #[arg(long = "client")]
    clients: Vec<String>,

    /// Restrict months to January through the current month
    #[arg(long)]
    ytd: bool,

    /// Hide the totalizer row
    #[arg(long)]
    no_total: bool,
}

impl FilterArgs {
    /// Overlay the flags that were given on top of `base`.
    fn apply_to(&self, mut base: FilterSelection) -> FilterSelection {
        let names =
            |v: &[String]| -> BTreeSet<String> { v.iter().map(|s| normalize_text(s)).collect() };
        if self.year_from.is_some() {
            base.year_from = self.year_from;
        }
        if self.year_to.is_some() {
            base.year_to = self.year_to;
        }
        if !self.months.is_empty() {
            base.months = Some(self.months.iter().copied().collect());
        }
        if self.ytd {
            base.year_to_date(Local::now().date_naive());
        }
        if !self.issuers.is_empty() {
            base.issuers = Some(names(&self.issuers));
        }
        if !self.executives.is_empty() {
            base.executives = Some(names(&self.executives));
        }
        if !self.clients.is_empty() {
            base.clients = names(&self.clients);
        }
        if self.no_total {
            base.show_total = false;
        }
        base
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Headline figures, monthly evolution and issuer share per year
    Summary,

    /// Exclusive, shared and absent clients per issuer
    Cohorts {
        /// Intersection matrix to show
        #[arg(long, value_enum, default_value_t = MatrixMetric::Clients)]
        metric: MatrixMetric,
    },

    /// Year-over-year comparison
    Variance {
        #[arg(long, value_enum, default_value_t = GroupKey::Client)]
        by: GroupKey,
    },

    /// Lost, new and retained clients
    Churn,

    /// ABC (Pareto) classification of clients
    Abc {
        #[arg(long, value_enum, default_value_t = AbcMetric::Revenue)]
        metric: AbcMetric,
    },

    /// Top clients ranking
    Top {
        #[arg(long, value_enum, default_value_t = RankCriterion::Revenue)]
        by: RankCriterion,

        /// Only count business with this issuer
        #[arg(long = "only-issuer")]
        issuer: Option<String>,

        /// Only count business in this year
        #[arg(long)]
        year: Option<i32>,

        /// Number of clients (defaults to the configured top_n)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Averages per client and price-versus-volume figures
    Efficiency {
        /// Volume table for this year only (all filtered years when omitted)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Write every report as CSV sheets plus a manifest
    Export {
        /// Bundle name (defaults to a timestamp)
        #[arg(long)]
        name: Option<String>,
    },

    /// Interactive menu (the default)
    Menu,
}

fn load_config(cli: &Cli) -> Result<ReportConfig> {
    let mut config = match &cli.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::default(),
    };
    if let Some(input) = &cli.input {
        config.input = Some(input.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    Ok(config)
}

fn open_session(config: &ReportConfig, filters: &FilterArgs) -> Result<Session> {
    let path = config.input.as_deref().ok_or_else(|| {
        ReportError::InvalidConfig("no ledger file; pass --input or set `input`".to_string())
    })?;
    let mut session = Session::open(path, config)?;
    if let Some(state) = &config.filter_state {
        if session.restore_filters(state)? {
            info!("Restored filters from {:?}", state);
        }
    }
    let selection = filters.apply_to(session.selection().clone());
    session.apply_filters(selection)?;
    Ok(session)
}

fn default_export_name() -> String {
    format!("report_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

fn print_sheets(bundle: &ReportBundle, sheets: &[Sheet]) {
    println!("{}", reports::bundle_caption(bundle));
    for sheet in sheets {
        preview_sheet(sheet, PREVIEW_ROWS);
    }
}

fn export(config: &ReportConfig, bundle: &ReportBundle, name: &str) -> Result<()> {
    let sheets = reports::bundle_sheets(bundle);
    let manifest = export_bundle(
        &config.output_dir,
        name,
        &sheets,
        &bundle.filter_rows,
        &bundle.summary(),
    )?;
    println!(
        "Exported {} sheets to {}",
        manifest.sheets.len(),
        manifest.directory.display()
    );
    Ok(())
}

fn run_command(config: &ReportConfig, filters: &FilterArgs, command: Command) -> Result<()> {
    let session = open_session(config, filters)?;
    let mut request = PipelineRequest::from_config(config);
    if let Command::Abc { metric } = &command {
        request.abc_metric = *metric;
    }
    if let Command::Efficiency { year } = &command {
        request.efficiency_year = *year;
    }
    if let Command::Top {
        by,
        issuer,
        year,
        limit,
    } = &command
    {
        request.ranking.criterion = *by;
        request.ranking.issuer = issuer.as_deref().map(normalize_text);
        request.ranking.year = *year;
        if let Some(limit) = limit {
            request.ranking.limit = *limit;
        }
    }

    let bundle = match session.run(&request) {
        Ok(b) => b,
        Err(ReportError::EmptySelection) => {
            println!("No transactions match the selected filters.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let total = bundle.show_total;

    let sheets = match command {
        Command::Summary => vec![
            reports::overview_sheet(&bundle.headline, &bundle.last_update),
            reports::monthly_sheet(&bundle.monthly),
            reports::issuer_share_sheet(&bundle.issuer_share),
        ],
        Command::Cohorts { metric } => reports::cohort_sheets(&bundle.cohorts, &[metric], total),
        Command::Variance { by } => {
            let mut sheets: Vec<Sheet> = bundle
                .variance_by(by)
                .map(|t| reports::variance_sheet(t, total))
                .into_iter()
                .collect();
            if by == GroupKey::Issuer {
                sheets.push(reports::client_count_sheet(&bundle.client_counts, total));
            }
            sheets
        }
        Command::Churn => reports::churn_sheets(&bundle.churn, total),
        Command::Abc { .. } => reports::abc_sheets(&bundle.abc),
        Command::Top { .. } => vec![reports::ranking_sheet(&bundle.ranking, total)],
        Command::Efficiency { .. } => {
            let mut sheets = vec![reports::client_averages_sheet(&bundle.client_averages, total)];
            sheets.extend(reports::efficiency_sheets(&bundle.efficiency, &bundle.volume));
            sheets
        }
        Command::Export { name } => {
            let name = name.unwrap_or_else(default_export_name);
            return export(config, &bundle, &name);
        }
        Command::Menu => Vec::new(),
    };
    print_sheets(&bundle, &sheets);
    Ok(())
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice(input: &mut impl BufRead) -> Option<String> {
    prompt_line(input, "Enter choice: ")
}

/// `None` once input is closed or unreadable.
fn prompt_line(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf.trim().to_string()),
        Err(e) => {
            error!("Could not read input: {}", e);
            None
        }
    }
}

/// Ask the user whether to go back to the menu after generating reports.
///
/// Returns `Some(true)` for `Y`, `Some(false)` for `N` and `None` when input ends.
fn prompt_back_to_menu(input: &mut impl BufRead) -> Option<bool> {
    loop {
        let resp = prompt_line(input, "Back to Report Selection (Y/N): ")?.to_uppercase();
        match resp.as_str() {
            "Y" => return Some(true),
            "N" => return Some(false),
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

struct Menu<'a> {
    config: &'a ReportConfig,
    filters: &'a FilterArgs,
    session: Option<Session>,
}

impl Menu<'_> {
    /// Option [1]: load and clean the ledger, printing diagnostics.
    fn handle_load(&mut self) {
        match open_session(self.config, self.filters) {
            Ok(session) => {
                let report = session.load_report();
                println!(
                    "Processing dataset... ({} rows read, {} loaded, last update {})",
                    format_int(report.total_rows as u64),
                    format_int(report.loaded_rows as u64),
                    report.last_update
                );
                if report.dropped_rows > 0 {
                    println!(
                        "Note: {} rows skipped due to unreadable records or periods.",
                        format_int(report.dropped_rows as u64)
                    );
                }
                if report.coerced_revenue > 0 {
                    println!(
                        "Note: {} revenue values could not be read and count as zero.",
                        format_int(report.coerced_revenue as u64)
                    );
                }
                if report.recoded_rows > 0 {
                    println!(
                        "Note: {} rows were not UTF-8 and were read as Latin-1.",
                        format_int(report.recoded_rows as u64)
                    );
                }
                if !report.has_insertions {
                    println!("Info: no insertions column; unit costs are undefined.");
                }
                println!("Filters: {}\n", session.selection().describe());
                self.session = Some(session);
            }
            Err(e) => eprintln!("Failed to load file: {}\n", e),
        }
    }

    fn loaded(&mut self) -> Option<&mut Session> {
        if self.session.is_none() {
            println!("Error: No data loaded. Please load the file first (option 1).\n");
        }
        self.session.as_mut()
    }

    fn bundle(&mut self) -> Option<ReportBundle> {
        let request = PipelineRequest::from_config(self.config);
        let session = self.loaded()?;
        match session.run(&request) {
            Ok(bundle) => Some(bundle),
            Err(ReportError::EmptySelection) => {
                println!("No transactions match the selected filters.\n");
                None
            }
            Err(e) => {
                eprintln!("Report error: {}\n", e);
                None
            }
        }
    }

    /// Option [2]: run every report and preview it.
    fn handle_generate_reports(&mut self) -> bool {
        let Some(bundle) = self.bundle() else {
            return false;
        };
        println!("Generating reports...\n");
        print_sheets(&bundle, &reports::bundle_sheets(&bundle));
        true
    }

    fn handle_export(&mut self, input: &mut impl BufRead) {
        let Some(bundle) = self.bundle() else {
            return;
        };
        let Some(name) = prompt_line(input, "Export name (blank for timestamp): ") else {
            return;
        };
        let name = if name.is_empty() {
            default_export_name()
        } else {
            name
        };
        if let Err(e) = export(self.config, &bundle, &name) {
            eprintln!("Export failed: {}\n", e);
        }
    }

    fn update_filters(&mut self, change: impl FnOnce(&mut Session)) {
        let state = self.config.filter_state.clone();
        let Some(session) = self.loaded() else {
            return;
        };
        change(session);
        println!("Filters: {}\n", session.selection().describe());
        if let Some(path) = state {
            if let Err(e) = session.save_filters(&path) {
                eprintln!("Could not save filters: {}\n", e);
            }
        }
    }

    /// Menu loop; returns on option [0] or when input ends.
    fn run(mut self, input: &mut impl BufRead) {
        loop {
            let total = self
                .session
                .as_ref()
                .map_or(true, |s| s.selection().show_total);
            println!("Select an option:");
            println!("[1] Load the file");
            println!("[2] Generate Reports");
            println!("[3] Toggle totalizer row (currently {})", if total { "on" } else { "off" });
            println!("[4] Year-to-date months");
            println!("[5] Reset filters");
            println!("[6] Export reports");
            println!("[0] Exit\n");
            let Some(choice) = read_choice(input) else {
                println!("\nInput closed. Exiting the program.");
                break;
            };
            match choice.as_str() {
                "1" => self.handle_load(),
                "2" => {
                    println!();
                    if self.handle_generate_reports() && prompt_back_to_menu(input) != Some(true) {
                        println!("Exiting the program.");
                        break;
                    }
                }
                "3" => self.update_filters(|s| {
                    s.toggle_total();
                }),
                "4" => self.update_filters(|s| s.set_year_to_date(Local::now().date_naive())),
                "5" => self.update_filters(Session::reset_filters),
                "6" => self.handle_export(input),
                "0" => {
                    println!("Exiting the program.");
                    break;
                }
                _ => println!("Invalid choice. Please enter a number from 0 to 6.\n"),
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let result = load_config(&cli).and_then(|config| match cli.command {
        Some(Command::Menu) | None => {
            Menu {
                config: &config,
                filters: &cli.filters,
                session: None,
            }
            .run(&mut io::stdin().lock());
            Ok(())
        }
        Some(command) => run_command(&config, &cli.filters, command),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
