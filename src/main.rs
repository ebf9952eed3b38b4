use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pudl_etl::config::{Settings, DEFAULT_CONFIG_PATH};
use pudl_etl::constants::Source;
use pudl_etl::db::{ConnectionProvider, DatabaseKind, DbTarget};
use pudl_etl::extract::FsPartitionSource;
use pudl_etl::lifecycle::{
    InitReport, IntegratedInputs, IntegratedRequest, LifecycleManager, StagingRequest, StagingRetention,
};
use pudl_etl::{logging, metrics};
use pudl_etl::schema::SchemaRegistry;
use pudl_etl::tables::{IntegratedTable, StagingTable, TableSelection};
use pudl_etl::transform::crosswalk::MAPPINGS_DIR;
use pudl_etl::transform::{Crosswalk, LoadYears};
use pudl_etl::years::{ReferenceYear, YearSpan};

#[derive(Parser)]
#[command(name = "pudl-etl")]
#[command(about = "Integrates FERC Form 1, EIA-923 and EIA-860 data into a normalized utility database")]
#[command(version)]
struct Cli {
    /// Settings file; missing means defaults plus PUDL_* environment variables
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Directory for the JSON log files
    #[arg(long, default_value = "logs")]
    log_dir: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the FERC Form 1 staging database
    InitFerc1 {
        /// Staging tables (comma-separated); defaults to the standard FERC Form 1 set
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Reporting years (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        years: Vec<u16>,
        /// Year whose table layouts are used; defaults to the latest working year
        #[arg(long)]
        reference_year: Option<u16>,
        /// Write to the configured live database instead of the test instance
        #[arg(long)]
        live: bool,
    },
    /// Build the integrated database from FERC Form 1 staging and the EIA partitions
    InitPudl {
        /// Integrated tables (comma-separated); defaults to every source given years
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        ferc1_years: Vec<u16>,
        #[arg(long, value_delimiter = ',')]
        eia923_years: Vec<u16>,
        #[arg(long, value_delimiter = ',')]
        eia860_years: Vec<u16>,
        /// Write to the configured live integrated database
        #[arg(long)]
        live: bool,
        /// Read FERC Form 1 staging from the live database
        #[arg(long)]
        live_ferc1: bool,
        /// Keep the scratch EIA staging databases after loading
        #[arg(long)]
        retain_staging: bool,
    },
    /// Drop every table the pipeline manages from a test database
    Drop {
        /// ferc1, eia923, eia860 or pudl
        #[arg(long)]
        db: String,
        /// Target the live instance (always refused)
        #[arg(long)]
        live: bool,
    },
    /// Print a resolved schema as JSON without touching any database
    Schema {
        /// ferc1, eia923, eia860 or pudl
        #[arg(long)]
        db: String,
        #[arg(long)]
        year: Option<u16>,
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

fn database_kind(name: &str) -> Result<DatabaseKind> {
    if name.trim().eq_ignore_ascii_case("pudl") {
        return Ok(DatabaseKind::Integrated);
    }
    let source: Source = name.parse()?;
    Ok(DatabaseKind::Staging(source))
}

fn staging_tables(source: Source, names: &[String]) -> Result<TableSelection<StagingTable>> {
    if names.is_empty() {
        return Ok(TableSelection::<StagingTable>::defaults(source));
    }
    Ok(TableSelection::parse(source, names)?)
}

fn print_report(report: &InitReport) -> Result<()> {
    println!("{}", report.to_json()?);
    for note in &report.notes {
        warn!("Schema note: {}", note);
    }
    for failure in report.failures() {
        warn!("Partition not extracted: {}", failure);
    }
    info!(
        "{} finished in state {:?}: {} rows extracted, {} rows loaded, {} excluded",
        report.database,
        report.state,
        report.rows_extracted(),
        report.rows_loaded(),
        report.exclusion_count()
    );
    Ok(())
}

fn init_ferc1(
    settings: &Settings,
    registry: Arc<SchemaRegistry>,
    tables: &[String],
    years: Vec<u16>,
    reference_year: Option<u16>,
    live: bool,
) -> Result<()> {
    let mut request = StagingRequest::new(
        staging_tables(Source::Ferc1, tables)?,
        YearSpan::new(Source::Ferc1, years)?,
    )?;
    if let Some(year) = reference_year {
        request = request.with_reference_year(year)?;
    }

    let provider = ConnectionProvider::new(settings);
    let kind = DatabaseKind::Staging(Source::Ferc1);
    let target = settings.databases.target_for(kind, live);
    let handle = provider.connect(kind, target)?;
    let mut manager = LifecycleManager::new(handle, registry);
    if !target.is_live() {
        manager.drop_all()?;
    }
    let partitions = FsPartitionSource::new(&settings.data_root);
    let report = manager.init_staging(&request, &partitions, !target.is_live())?;
    print_report(&report)
}

fn init_pudl(
    settings: &Settings,
    registry: Arc<SchemaRegistry>,
    tables: &[String],
    years: [(Source, Vec<u16>); 3],
    live: bool,
    live_ferc1: bool,
    retain_staging: bool,
) -> Result<()> {
    let mut load_years = LoadYears::new();
    let mut defaults: Option<TableSelection<IntegratedTable>> = None;
    for (source, list) in years {
        if list.is_empty() {
            continue;
        }
        load_years = load_years.with(YearSpan::new(source, list)?);
        let source_defaults = TableSelection::<IntegratedTable>::defaults(source);
        defaults = Some(match defaults {
            Some(selection) => selection.merge(&source_defaults),
            None => source_defaults,
        });
    }
    let selection = if tables.is_empty() {
        defaults.context("no years given for any source")?
    } else {
        TableSelection::<IntegratedTable>::parse_any(tables)?
    };
    let retention = StagingRetention::from_retain_flag(retain_staging || settings.retain_staging);
    let request = IntegratedRequest::new(selection, load_years).with_retention(retention);

    let provider = ConnectionProvider::new(settings);
    let ferc1_kind = DatabaseKind::Staging(Source::Ferc1);
    let ferc1_target = settings.databases.target_for(ferc1_kind, live_ferc1);
    let ferc1 = match request.years().for_source(Source::Ferc1) {
        Some(_) => Some(provider.connect(ferc1_kind, ferc1_target)?),
        None => None,
    };

    let target = settings.databases.target_for(DatabaseKind::Integrated, live);
    let handle = provider.connect(DatabaseKind::Integrated, target)?;
    let mut manager = LifecycleManager::new(handle, registry);
    if !target.is_live() {
        manager.drop_all()?;
    }
    let partitions = FsPartitionSource::new(&settings.data_root);
    let inputs = IntegratedInputs {
        ferc1: ferc1.as_ref(),
        provider: &provider,
        partitions: &partitions,
        crosswalk: Crosswalk::load(&settings.data_root.join(MAPPINGS_DIR))?,
    };
    let report = manager.init_integrated(&request, inputs, !target.is_live())?;
    print_report(&report)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);
    metrics::register_all_metrics();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let registry = Arc::new(SchemaRegistry::new()?);

    match cli.command {
        Commands::InitFerc1 {
            tables,
            years,
            reference_year,
            live,
        } => init_ferc1(&settings, registry, &tables, years, reference_year, live)?,
        Commands::InitPudl {
            tables,
            ferc1_years,
            eia923_years,
            eia860_years,
            live,
            live_ferc1,
            retain_staging,
        } => init_pudl(
            &settings,
            registry,
            &tables,
            [
                (Source::Ferc1, ferc1_years),
                (Source::Eia923, eia923_years),
                (Source::Eia860, eia860_years),
            ],
            live,
            live_ferc1,
            retain_staging,
        )?,
        Commands::Drop { db, live } => {
            let kind = database_kind(&db)?;
            let provider = ConnectionProvider::new(&settings);
            let handle = provider.connect(kind, DbTarget::from_live_flag(live))?;
            let mut manager = LifecycleManager::new(handle, registry);
            let dropped = manager.drop_all()?;
            println!("Dropped {} tables from {}", dropped.len(), kind);
            for name in dropped {
                println!("  {name}");
            }
        }
        Commands::Schema { db, year, tables } => {
            let schema = match database_kind(&db)? {
                DatabaseKind::Integrated => {
                    let selection = if tables.is_empty() {
                        Source::ALL
                            .iter()
                            .map(|s| TableSelection::<IntegratedTable>::defaults(*s))
                            .reduce(|all, next| all.merge(&next))
                            .context("no integrated tables registered")?
                    } else {
                        TableSelection::<IntegratedTable>::parse_any(&tables)?
                    };
                    registry.resolve_integrated(&selection)?
                }
                DatabaseKind::Staging(source) => {
                    let reference_year = match year {
                        Some(year) => ReferenceYear::new(source, year)?,
                        None => ReferenceYear::latest(source),
                    };
                    registry.resolve_staging(reference_year, &staging_tables(source, &tables)?)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}
