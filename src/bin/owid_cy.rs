use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use owid_cy::app::{AggregateSummary, App, CitationSummary, ProgressSink};
use owid_cy::catalog::Catalog;
use owid_cy::config::{ConfigLoader, ResolvedConfig};
use owid_cy::domain::Slug;
use owid_cy::error::OwidError;
use owid_cy::grapher::GrapherHttpClient;
use owid_cy::output::{JsonOutput, LogSink, OutputMode, write_citations, write_table};

#[derive(Parser)]
#[command(name = "owid-cy")]
#[command(about = "Join Our World in Data grapher datasets into one country-year table")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./owid-cy.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print JSON summaries instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every dataset and write the outer-joined table as CSV")]
    Agg(FetchArgs),
    #[command(about = "Fetch the long citation of every cataloged column")]
    Cite(FetchArgs),
    #[command(about = "Show the dataset catalog")]
    Catalog,
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Output file; stdout when omitted
    #[arg(long, short)]
    output: Option<Utf8PathBuf>,

    /// Restrict the run to these dataset slugs
    #[arg(long, num_args = 1..)]
    only: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<OwidError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OwidError) -> u8 {
    match error {
        OwidError::InvalidSlug(_)
        | OwidError::InvalidDescriptor { .. }
        | OwidError::ConfigRead(_)
        | OwidError::ConfigParse(_) => 2,
        OwidError::Http { .. } | OwidError::Status { .. } | OwidError::Client(_) => 3,
        OwidError::Parse { .. }
        | OwidError::MissingColumn { .. }
        | OwidError::RenameCollision { .. }
        | OwidError::DuplicateColumn(_) => 4,
        OwidError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Agg(args) => run_agg(args, resolved, output_mode),
        Commands::Cite(args) => run_cite(args, resolved, output_mode),
        Commands::Catalog => run_catalog(&resolved.catalog, output_mode),
    }
}

fn build_app(args: &FetchArgs, resolved: ResolvedConfig) -> miette::Result<App<GrapherHttpClient>> {
    let catalog = if args.only.is_empty() {
        resolved.catalog
    } else {
        let slugs = args
            .only
            .iter()
            .map(|slug| slug.parse::<Slug>())
            .collect::<Result<Vec<_>, _>>()?;
        resolved.catalog.subset(&slugs)?
    };
    let client = GrapherHttpClient::with_settings(&resolved.base_url, resolved.retry, resolved.timeout)?;
    Ok(App::new(client, catalog))
}

fn progress_sink(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Human => &LogSink,
        OutputMode::Json => &JsonOutput,
    }
}

fn run_agg(args: FetchArgs, resolved: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(&args, resolved)?;
    let table = app.aggregate(progress_sink(output_mode))?;
    write_table(&table, args.output.as_deref())?;

    let summary = AggregateSummary::new(
        app.catalog(),
        &table,
        args.output.as_ref().map(|path| path.to_string()),
    );
    match output_mode {
        OutputMode::Json if args.output.is_some() => {
            JsonOutput::print_aggregate(&summary).into_diagnostic()?
        }
        OutputMode::Json => {}
        OutputMode::Human => eprintln!(
            "{} datasets joined: {} rows x {} columns",
            summary.datasets,
            summary.rows,
            summary.columns.len() + 2
        ),
    }
    Ok(())
}

fn run_cite(args: FetchArgs, resolved: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(&args, resolved)?;
    let citations = app.collect_citations(progress_sink(output_mode))?;
    let summary = CitationSummary::new(
        app.catalog(),
        &citations,
        args.output.as_ref().map(|path| path.to_string()),
    );

    match output_mode {
        OutputMode::Json => {
            if let Some(path) = &args.output {
                write_citations(&citations, Some(path.as_path()))?;
            }
            JsonOutput::print_citations(&summary).into_diagnostic()?;
        }
        OutputMode::Human => {
            write_citations(&citations, args.output.as_deref())?;
            eprintln!(
                "{} citations from {} datasets",
                citations.len(),
                summary.datasets
            );
        }
    }
    Ok(())
}

fn run_catalog(catalog: &Catalog, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_catalog(catalog).into_diagnostic()?,
        OutputMode::Human => {
            for descriptor in catalog {
                println!("{}", descriptor.slug);
                for column in &descriptor.columns {
                    println!("  {} -> {}", column.source, column.target);
                }
                if let Some(citation) = &descriptor.citation {
                    println!("  cite: {citation}");
                }
            }
        }
    }
    Ok(())
}
