//! Database lifecycle: define the schema, extract, load, and tear down test
//! instances again.
//!
//! A [`LifecycleManager`] owns one [`DbHandle`]. Test instances move through
//! `Uninitialized -> SchemaDefined -> Populated` and back to `Uninitialized`
//! on drop; live instances stay `HeldLive` and are never dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::constants::Source;
use crate::db::{quote_ident, ConnectionProvider, DatabaseKind, DbHandle, DbTarget};
use crate::error::{ConfigError, ExtractionFailure, Result};
use crate::extract::{extract, ExtractionReport, PartitionSource};
use crate::schema::ddl::ETL_RUNS;
use crate::schema::{define_integrated_schema, define_schema, drop_managed_tables, CompatibilityNote, SchemaRegistry};
use crate::tables::{IntegratedTable, RegisteredTable, StagingTable, TableSelection};
use crate::transform::{load, Crosswalk, LoadReport, LoadYears, StagingSources};
use crate::years::{ReferenceYear, YearSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DbState {
    Uninitialized,
    SchemaDefined,
    Populated,
    /// A live instance; the pipeline adds to it but never resets it.
    HeldLive,
}

/// What happens to the scratch EIA staging databases after an integrated
/// load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingRetention {
    #[default]
    Discard,
    Retain,
}

impl StagingRetention {
    pub fn from_retain_flag(retain: bool) -> Self {
        if retain {
            StagingRetention::Retain
        } else {
            StagingRetention::Discard
        }
    }
}

/// Tables and years to extract into one staging database.
#[derive(Debug, Clone)]
pub struct StagingRequest {
    tables: TableSelection<StagingTable>,
    years: YearSpan,
    reference_year: ReferenceYear,
}

impl StagingRequest {
    /// The schema is defined with the source's latest working year unless
    /// [`StagingRequest::with_reference_year`] says otherwise.
    pub fn new(tables: TableSelection<StagingTable>, years: YearSpan) -> Result<Self> {
        let source = years.source();
        if let Some(stray) = tables.iter().find(|t| t.dataset() != source) {
            return Err(ConfigError::UnknownTable {
                dataset: source.to_string(),
                name: stray.name().to_string(),
            }
            .into());
        }
        Ok(Self {
            tables,
            years,
            reference_year: ReferenceYear::latest(source),
        })
    }

    pub fn with_reference_year(mut self, year: u16) -> Result<Self> {
        self.reference_year = ReferenceYear::new(self.source(), year)?;
        Ok(self)
    }

    pub fn source(&self) -> Source {
        self.years.source()
    }

    pub fn tables(&self) -> &TableSelection<StagingTable> {
        &self.tables
    }

    pub fn years(&self) -> &YearSpan {
        &self.years
    }

    pub fn reference_year(&self) -> ReferenceYear {
        self.reference_year
    }
}

/// Integrated tables to load and the years to read from each source.
#[derive(Debug, Clone)]
pub struct IntegratedRequest {
    tables: TableSelection<IntegratedTable>,
    years: LoadYears,
    retention: StagingRetention,
}

impl IntegratedRequest {
    pub fn new(tables: TableSelection<IntegratedTable>, years: LoadYears) -> Self {
        Self {
            tables,
            years,
            retention: StagingRetention::Discard,
        }
    }

    pub fn with_retention(mut self, retention: StagingRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn tables(&self) -> &TableSelection<IntegratedTable> {
        &self.tables
    }

    pub fn years(&self) -> &LoadYears {
        &self.years
    }

    pub fn retention(&self) -> StagingRetention {
        self.retention
    }

    /// Every table the run loads, core tables first.
    pub fn load_order(&self) -> Vec<IntegratedTable> {
        self.tables.clone().with_core().iter().collect()
    }

    /// Staging tables of `source` that the loaded tables read.
    fn staging_inputs(&self, source: Source) -> Vec<StagingTable> {
        let mut inputs: Vec<StagingTable> = self
            .load_order()
            .into_iter()
            .flat_map(|t| t.inputs().iter().copied())
            .filter(|t| t.dataset() == source)
            .collect();
        inputs.sort();
        inputs.dedup();
        inputs
    }

    /// Staging tables of `source` that selected tables cannot load without.
    /// Entity tables read their inputs only when present.
    fn required_inputs(&self, source: Source) -> Vec<StagingTable> {
        let mut inputs: Vec<StagingTable> = self
            .tables
            .iter()
            .filter(|t| !t.is_core())
            .flat_map(|t| t.inputs().iter().copied())
            .filter(|t| t.dataset() == source)
            .collect();
        inputs.sort();
        inputs.dedup();
        inputs
    }

    /// Check the whole request before any DDL is issued. Returns the EIA
    /// staging requests to extract into scratch instances.
    fn plan(&self, registry: &SchemaRegistry, target: &DbHandle, ferc1: Option<&DbHandle>) -> Result<Vec<StagingRequest>> {
        registry.resolve_integrated(&self.tables)?;
        for table in self.load_order() {
            let Some(source) = table.source() else {
                continue;
            };
            if self.years.for_source(source).is_none() {
                return Err(ConfigError::EmptyYears { dataset: source }.into());
            }
            if source == Source::Ferc1 && ferc1.is_none() {
                return Err(ConfigError::MissingStaging(Source::Ferc1).into());
            }
        }
        if let Some(handle) = ferc1 {
            handle.ensure_kind(DatabaseKind::Staging(Source::Ferc1))?;
            for input in self.required_inputs(Source::Ferc1) {
                if !handle.table_exists(input.name())? {
                    return Err(ConfigError::TableNotDefined {
                        table: input.to_string(),
                    }
                    .into());
                }
            }
        }
        if target.is_live() {
            for table in self.load_order() {
                if !target.table_exists(table.name())? {
                    continue;
                }
                let rows = target.row_count(table.name())?;
                if rows > 0 {
                    return Err(ConfigError::NonEmptyTable {
                        table: table.name().to_string(),
                        rows,
                    }
                    .into());
                }
            }
        }

        let mut staging = Vec::new();
        for source in [Source::Eia923, Source::Eia860] {
            let Some(years) = self.years.for_source(source) else {
                continue;
            };
            let inputs = self.staging_inputs(source);
            if inputs.is_empty() {
                continue;
            }
            let request = StagingRequest::new(TableSelection::from_tables(inputs)?, years.clone())?;
            registry.resolve_staging(request.reference_year(), request.tables())?;
            staging.push(request);
        }
        Ok(staging)
    }
}

/// Everything an integrated load reads besides its own database.
pub struct IntegratedInputs<'a> {
    /// The FERC Form 1 staging database, test or live.
    pub ferc1: Option<&'a DbHandle>,
    /// Opens the scratch EIA staging instances.
    pub provider: &'a ConnectionProvider,
    pub partitions: &'a dyn PartitionSource,
    pub crosswalk: Crosswalk,
}

/// Outcome of one init call.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub run_id: Uuid,
    pub database: DatabaseKind,
    pub target: DbTarget,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub notes: Vec<CompatibilityNote>,
    pub extractions: Vec<ExtractionReport>,
    pub loads: Vec<LoadReport>,
    pub state: DbState,
}

impl InitReport {
    fn start(handle: &DbHandle) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            database: handle.kind(),
            target: handle.target(),
            started_at: now,
            finished_at: now,
            notes: Vec::new(),
            extractions: Vec::new(),
            loads: Vec::new(),
            state: DbState::Uninitialized,
        }
    }

    pub fn rows_extracted(&self) -> u64 {
        self.extractions.iter().map(ExtractionReport::total).sum()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.loads.iter().map(|l| l.rows_loaded).sum()
    }

    pub fn exclusion_count(&self) -> usize {
        self.loads.iter().map(|l| l.exclusions.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractionFailure> {
        self.extractions.iter().flat_map(|e| e.failures.iter())
    }

    /// No partition failed to extract.
    pub fn is_complete(&self) -> bool {
        self.extractions.iter().all(ExtractionReport::is_complete)
    }

    pub fn load_for(&self, table: IntegratedTable) -> Option<&LoadReport> {
        self.loads.iter().find(|l| l.table == table)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct LifecycleManager {
    handle: DbHandle,
    registry: Arc<SchemaRegistry>,
    state: DbState,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl LifecycleManager {
    pub fn new(handle: DbHandle, registry: Arc<SchemaRegistry>) -> Self {
        let state = if handle.is_live() {
            DbState::HeldLive
        } else {
            DbState::Uninitialized
        };
        Self { handle, registry, state }
    }

    pub fn handle(&self) -> &DbHandle {
        &self.handle
    }

    pub fn into_handle(self) -> DbHandle {
        self.handle
    }

    pub fn state(&self) -> DbState {
        self.state
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// `testing` must agree with the handle: test runs never touch a live
    /// instance and non-test runs only write to one.
    fn check_target(&self, testing: bool) -> Result<()> {
        let expected = if testing { DbTarget::Test } else { DbTarget::Live };
        let actual = self.handle.target();
        if actual != expected {
            return Err(ConfigError::TargetMismatch {
                kind: self.handle.kind(),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    fn check_fresh(&self) -> Result<()> {
        match self.state {
            DbState::Uninitialized | DbState::HeldLive => Ok(()),
            DbState::SchemaDefined | DbState::Populated => {
                Err(ConfigError::AlreadyInitialized(self.handle.kind()).into())
            }
        }
    }

    fn advance(&mut self, state: DbState) {
        if self.state != DbState::HeldLive {
            self.state = state;
        }
    }

    /// Define the staging schema and extract every requested table and year.
    ///
    /// Per-year extraction failures are reported, not raised.
    #[instrument(skip(self, request, partitions), fields(db = %self.handle.kind(), target = %self.handle.target()))]
    pub fn init_staging(
        &mut self,
        request: &StagingRequest,
        partitions: &dyn PartitionSource,
        testing: bool,
    ) -> Result<InitReport> {
        self.check_target(testing)?;
        self.handle.ensure_kind(DatabaseKind::Staging(request.source()))?;
        self.check_fresh()?;

        let mut report = InitReport::start(&self.handle);
        let schema = define_schema(&self.handle, &self.registry, request.reference_year(), request.tables())?;
        self.advance(DbState::SchemaDefined);
        report.notes = schema.notes.clone();

        for table in request.tables().iter() {
            let extraction = extract(&self.handle, &schema, table, request.years(), partitions)?;
            report.extractions.push(extraction);
        }
        self.advance(DbState::Populated);

        report.state = self.state;
        report.finished_at = Utc::now();
        info!(
            "Initialized {} with {} rows from {} tables",
            self.handle.kind(),
            report.rows_extracted(),
            report.extractions.len()
        );
        Ok(report)
    }

    /// Define the integrated schema and load it: static tables, then
    /// entities, then every selected table.
    ///
    /// EIA staging is extracted into scratch test instances from
    /// `inputs.provider`; FERC Form 1 staging is read from `inputs.ferc1`.
    #[instrument(skip(self, request, inputs), fields(target = %self.handle.target()))]
    pub fn init_integrated(
        &mut self,
        request: &IntegratedRequest,
        inputs: IntegratedInputs<'_>,
        testing: bool,
    ) -> Result<InitReport> {
        self.check_target(testing)?;
        self.handle.ensure_kind(DatabaseKind::Integrated)?;
        self.check_fresh()?;
        let staging_requests = request.plan(&self.registry, &self.handle, inputs.ferc1)?;

        let mut report = InitReport::start(&self.handle);
        let schema = define_integrated_schema(&self.handle, &self.registry, request.tables())?;
        self.advance(DbState::SchemaDefined);
        report.notes = schema.notes;

        let mut scratch = Vec::with_capacity(staging_requests.len());
        for staging in &staging_requests {
            let handle = inputs
                .provider
                .connect(DatabaseKind::Staging(staging.source()), DbTarget::Test)?;
            let mut manager = LifecycleManager::new(handle, Arc::clone(&self.registry));
            manager.drop_all()?;
            let extracted = manager.init_staging(staging, inputs.partitions, true)?;
            report.notes.extend(extracted.notes);
            report.extractions.extend(extracted.extractions);
            scratch.push(manager);
        }

        let mut sources = StagingSources::new().with_crosswalk(inputs.crosswalk);
        if let Some(ferc1) = inputs.ferc1 {
            sources = sources.with(ferc1)?;
        }
        for manager in &scratch {
            sources = sources.with(manager.handle())?;
        }
        for table in request.load_order() {
            report.loads.push(load(&self.handle, table, &sources, request.years())?);
        }
        drop(sources);

        report.finished_at = Utc::now();
        record_run(&self.handle, &report, request.years())?;

        for mut manager in scratch {
            match request.retention() {
                StagingRetention::Discard => {
                    manager.drop_all()?;
                }
                StagingRetention::Retain => {
                    info!(
                        "Retaining {} staging at {}",
                        manager.handle().kind(),
                        manager.handle().location().display()
                    );
                }
            }
        }
        self.advance(DbState::Populated);
        report.state = self.state;

        if report.exclusion_count() > 0 {
            warn!("{} staging records were excluded from the load", report.exclusion_count());
        }
        info!(
            "Loaded {} rows into {} integrated tables",
            report.rows_loaded(),
            report.loads.len()
        );
        Ok(report)
    }

    /// Drop every table the pipeline manages. Refuses on a live instance
    /// without issuing any statement.
    pub fn drop_all(&mut self) -> Result<Vec<String>> {
        let dropped = drop_managed_tables(&self.handle, &self.registry)?;
        self.state = DbState::Uninitialized;
        Ok(dropped)
    }
}

fn record_run(handle: &DbHandle, report: &InitReport, years: &LoadYears) -> Result<()> {
    let tables: Vec<&str> = report.loads.iter().map(|l| l.table.name()).collect();
    let years: BTreeMap<Source, Vec<u16>> = years.spans().map(|s| (s.source(), s.to_vec())).collect();
    handle.conn().execute(
        &format!(
            "INSERT INTO {} (run_id, started_at, finished_at, tables, years, rows_loaded, exclusions) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            quote_ident(ETL_RUNS)
        ),
        params![
            report.run_id.to_string(),
            report.started_at.to_rfc3339(),
            report.finished_at.to_rfc3339(),
            serde_json::to_string(&tables)?,
            serde_json::to_string(&years)?,
            report.rows_loaded() as i64,
            report.exclusion_count() as i64,
        ],
    )?;
    Ok(())
}
