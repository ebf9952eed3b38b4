//! The FERC Form 1 staging database and the integrated database, composed
//! for one run.
//!
//! The FERC Form 1 database comes first. A test instance is built from
//! scratch; a live one only has its layout resolved before connecting. The
//! integrated database comes second. A test instance is built from whichever
//! FERC Form 1 instance was selected; a live one is only connected to.
//! Closing the session tears down test instances and leaves live ones alone.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::constants::Source;
use crate::db::{ConnectionProvider, DatabaseKind, DbHandle, DbTarget};
use crate::error::Result;
use crate::extract::FsPartitionSource;
use crate::lifecycle::{
    InitReport, IntegratedInputs, IntegratedRequest, LifecycleManager, StagingRequest, StagingRetention,
};
use crate::schema::{SchemaHandle, SchemaRegistry};
use crate::transform::crosswalk::MAPPINGS_DIR;
use crate::transform::Crosswalk;

/// What a session builds into its test instances.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub ferc1: StagingRequest,
    pub pudl: IntegratedRequest,
}

#[derive(Debug)]
pub struct Session {
    settings: Settings,
    provider: ConnectionProvider,
    registry: Arc<SchemaRegistry>,
    ferc1: LifecycleManager,
    pudl: LifecycleManager,
    /// Resolved FERC Form 1 layout when the live instance is used.
    ferc1_schema: Option<SchemaHandle>,
    reports: Vec<InitReport>,
    closed: bool,
}

impl Session {
    #[instrument(skip_all, fields(ferc1 = %settings.databases.ferc1, pudl = %settings.databases.pudl))]
    pub fn open(settings: Settings, plan: &SessionPlan) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::new()?);
        let provider = ConnectionProvider::new(&settings);
        let partitions = FsPartitionSource::new(&settings.data_root);
        let selection = settings.databases;
        let mut reports = Vec::new();

        let mut ferc1_schema = None;
        let ferc1 = match selection.ferc1 {
            DbTarget::Test => {
                let handle = provider.connect(DatabaseKind::Staging(Source::Ferc1), DbTarget::Test)?;
                let mut manager = LifecycleManager::new(handle, Arc::clone(&registry));
                manager.drop_all()?;
                reports.push(manager.init_staging(&plan.ferc1, &partitions, true)?);
                manager
            }
            DbTarget::Live => {
                let schema = registry.resolve_staging(plan.ferc1.reference_year(), plan.ferc1.tables())?;
                let handle = provider.connect(DatabaseKind::Staging(Source::Ferc1), DbTarget::Live)?;
                ferc1_schema = Some(schema);
                LifecycleManager::new(handle, Arc::clone(&registry))
            }
        };

        let handle = provider.connect(DatabaseKind::Integrated, selection.pudl)?;
        let mut pudl = LifecycleManager::new(handle, Arc::clone(&registry));
        if selection.pudl == DbTarget::Test {
            let mut request = plan.pudl.clone();
            if settings.retain_staging {
                request = request.with_retention(StagingRetention::Retain);
            }
            let inputs = IntegratedInputs {
                ferc1: Some(ferc1.handle()),
                provider: &provider,
                partitions: &partitions,
                crosswalk: Crosswalk::load(&settings.data_root.join(MAPPINGS_DIR))?,
            };
            pudl.drop_all()?;
            reports.push(pudl.init_integrated(&request, inputs, true)?);
        }

        info!(
            "Session ready: {} {} at {}, {} {} at {}",
            ferc1.handle().target(),
            ferc1.handle().kind(),
            ferc1.handle().location().display(),
            pudl.handle().target(),
            pudl.handle().kind(),
            pudl.handle().location().display()
        );
        Ok(Self {
            settings,
            provider,
            registry,
            ferc1,
            pudl,
            ferc1_schema,
            reports,
            closed: false,
        })
    }

    pub fn ferc1(&self) -> &DbHandle {
        self.ferc1.handle()
    }

    pub fn pudl(&self) -> &DbHandle {
        self.pudl.handle()
    }

    pub fn ferc1_schema(&self) -> Option<&SchemaHandle> {
        self.ferc1_schema.as_ref()
    }

    pub fn reports(&self) -> &[InitReport] {
        &self.reports
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Tear down the test instances, integrated first. Returns the dropped
    /// table names.
    pub fn close(mut self) -> Result<Vec<String>> {
        let dropped = self.teardown();
        self.closed = true;
        dropped
    }

    fn teardown(&mut self) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for manager in [&mut self.pudl, &mut self.ferc1] {
            if !manager.handle().is_live() {
                dropped.extend(manager.drop_all()?);
            }
        }
        Ok(dropped)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.teardown() {
            warn!("Session teardown failed: {}", e);
        }
    }
}
