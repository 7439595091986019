mod migration_monitor;
mod version_cleanup;

pub use migration_monitor::StoreMigrationMonitor;
pub use version_cleanup::StoreBackupVersionCleanup;
