//! Shared fixtures for the end-to-end adapter tests

use std::path::PathBuf;
use std::sync::{Arc, Once};

use tempfile::TempDir;
use tessera_drivers::{CacheService, ConnectionParams, DaoConfig, DaoFactory, TableDao};

/// Install a test-writer subscriber once; `RUST_LOG` overrides the default
pub fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tessera=debug,warn"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A SQLite adapter over a fresh database file.
///
/// Keep the struct alive for the whole test; dropping it removes the file.
pub struct SqliteFixture {
    pub dao: Arc<dyn TableDao>,
    pub factory: DaoFactory,
    pub path: PathBuf,
    _dir: TempDir,
}

impl SqliteFixture {
    pub async fn new(config: DaoConfig) -> anyhow::Result<Self> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tessera_test.db");
        let factory = DaoFactory::new(Arc::new(CacheService::default()), config);
        let dao = factory.create(Self::params_for(&path))?;
        Ok(Self {
            dao,
            factory,
            path,
            _dir: dir,
        })
    }

    pub fn params_for(path: &std::path::Path) -> ConnectionParams {
        ConnectionParams::sqlite(path.to_string_lossy())
    }

    /// Run DDL or seed statements one by one
    pub async fn run(&self, statements: &[&str]) -> anyhow::Result<()> {
        for sql in statements {
            self.dao.execute_raw_query(sql).await?;
        }
        Ok(())
    }
}
