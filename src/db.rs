use std::cell::Cell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Settings;
use crate::constants::Source;
use crate::error::{ConfigError, EtlError, Result};

/// Which instance of a database a run works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbTarget {
    /// Disposable; created on demand and torn down by the run that made it.
    #[default]
    Test,
    /// Persistent; never created, replaced or dropped by the pipeline.
    Live,
}

impl DbTarget {
    pub fn from_live_flag(live: bool) -> Self {
        if live {
            DbTarget::Live
        } else {
            DbTarget::Test
        }
    }

    pub fn is_live(self) -> bool {
        self == DbTarget::Live
    }
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbTarget::Test => f.write_str("test"),
            DbTarget::Live => f.write_str("live"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseKind {
    /// Raw per-source staging database.
    Staging(Source),
    /// The normalized cross-source database.
    Integrated,
}

impl DatabaseKind {
    pub fn slug(self) -> String {
        match self {
            DatabaseKind::Staging(source) => source.slug().to_string(),
            DatabaseKind::Integrated => "pudl".to_string(),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Staging(source) => write!(f, "{} staging", source.display_name()),
            DatabaseKind::Integrated => f.write_str("integrated (PUDL)"),
        }
    }
}

/// Test/live choice for the two databases a harness can point at. Every
/// combination is valid, including a live FERC Form 1 clone feeding a test
/// integrated database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSelection {
    pub ferc1: DbTarget,
    pub pudl: DbTarget,
}

impl DatabaseSelection {
    pub fn from_flags(live_ferc1_db: bool, live_pudl_db: bool) -> Self {
        Self {
            ferc1: DbTarget::from_live_flag(live_ferc1_db),
            pudl: DbTarget::from_live_flag(live_pudl_db),
        }
    }

    /// Target for `kind`. A `--live` style override wins; EIA staging has
    /// no configured selection and stays on test instances.
    pub fn target_for(&self, kind: DatabaseKind, force_live: bool) -> DbTarget {
        if force_live {
            return DbTarget::Live;
        }
        match kind {
            DatabaseKind::Staging(Source::Ferc1) => self.ferc1,
            DatabaseKind::Integrated => self.pudl,
            DatabaseKind::Staging(_) => DbTarget::Test,
        }
    }
}

/// An open database plus what it is. Every DDL statement goes through
/// [`DbHandle::execute_ddl`] and is counted.
pub struct DbHandle {
    conn: Connection,
    kind: DatabaseKind,
    target: DbTarget,
    location: PathBuf,
    ddl_issued: Cell<usize>,
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbHandle")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("location", &self.location)
            .field("ddl_issued", &self.ddl_issued.get())
            .finish()
    }
}

impl DbHandle {
    fn new(conn: Connection, kind: DatabaseKind, target: DbTarget, location: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            kind,
            target,
            location,
            ddl_issued: Cell::new(0),
        })
    }

    /// A private in-memory test instance; nothing outlives the handle.
    pub fn in_memory(kind: DatabaseKind) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| EtlError::Connection {
            location: ":memory:".to_string(),
            source,
        })?;
        Self::new(conn, kind, DbTarget::Test, PathBuf::from(":memory:"))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn target(&self) -> DbTarget {
        self.target
    }

    pub fn is_live(&self) -> bool {
        self.target.is_live()
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Number of DDL statements issued through this handle so far.
    pub fn ddl_issued(&self) -> usize {
        self.ddl_issued.get()
    }

    pub fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!(db = %self.kind, sql, "ddl");
        self.ddl_issued.set(self.ddl_issued.get() + 1);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// User tables present in the database, sorted by name.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn ensure_kind(&self, expected: DatabaseKind) -> Result<()> {
        if self.kind != expected {
            return Err(ConfigError::KindMismatch {
                expected,
                actual: self.kind,
            }
            .into());
        }
        Ok(())
    }
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Resolves handles to test and live database instances.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    test_dir: PathBuf,
    live_ferc1: Option<PathBuf>,
    live_pudl: Option<PathBuf>,
    live_eia923: Option<PathBuf>,
    live_eia860: Option<PathBuf>,
}

impl ConnectionProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            test_dir: settings.test_dir.clone(),
            live_ferc1: settings.live.ferc1_db.clone(),
            live_pudl: settings.live.pudl_db.clone(),
            live_eia923: settings.live.eia923_db.clone(),
            live_eia860: settings.live.eia860_db.clone(),
        }
    }

    /// A provider whose test instances live under `test_dir` and which knows
    /// no live databases.
    pub fn for_test_dir(test_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
            live_ferc1: None,
            live_pudl: None,
            live_eia923: None,
            live_eia860: None,
        }
    }

    pub fn with_live(mut self, kind: DatabaseKind, path: impl Into<PathBuf>) -> Self {
        let path = Some(path.into());
        match kind {
            DatabaseKind::Staging(Source::Ferc1) => self.live_ferc1 = path,
            DatabaseKind::Staging(Source::Eia923) => self.live_eia923 = path,
            DatabaseKind::Staging(Source::Eia860) => self.live_eia860 = path,
            DatabaseKind::Integrated => self.live_pudl = path,
        }
        self
    }

    pub fn test_path(&self, kind: DatabaseKind) -> PathBuf {
        self.test_dir.join(format!("{}.sqlite", kind.slug()))
    }

    fn live_path(&self, kind: DatabaseKind) -> Option<&PathBuf> {
        match kind {
            DatabaseKind::Staging(Source::Ferc1) => self.live_ferc1.as_ref(),
            DatabaseKind::Staging(Source::Eia923) => self.live_eia923.as_ref(),
            DatabaseKind::Staging(Source::Eia860) => self.live_eia860.as_ref(),
            DatabaseKind::Integrated => self.live_pudl.as_ref(),
        }
    }

    /// Open a handle. Test instances are created if absent; live instances
    /// must already exist and are opened without the create flag.
    #[instrument(skip(self))]
    pub fn connect(&self, kind: DatabaseKind, target: DbTarget) -> Result<DbHandle> {
        match target {
            DbTarget::Test => {
                fs::create_dir_all(&self.test_dir)?;
                let path = self.test_path(kind);
                let conn = Connection::open(&path).map_err(|source| EtlError::Connection {
                    location: path.display().to_string(),
                    source,
                })?;
                debug!("Opened test {} database at {}", kind, path.display());
                DbHandle::new(conn, kind, target, path)
            }
            DbTarget::Live => {
                let path = self
                    .live_path(kind)
                    .ok_or_else(|| ConfigError::InvalidSetting(format!("no live {kind} database configured")))?
                    .clone();
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = Connection::open_with_flags(&path, flags).map_err(|source| EtlError::Connection {
                    location: path.display().to_string(),
                    source,
                })?;
                info!("Connected to the live {} database at {}", kind, path.display());
                DbHandle::new(conn, kind, target, path)
            }
        }
    }
}
