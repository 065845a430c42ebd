use crate::error::ZpoolResult;
use crate::pool::{ExportedZpool, Zpool};

/// Abstraction over the pool-management commands.
///
/// Implementations provide a thin, testable surface over the system tool so
/// callers can be exercised without invoking real `zpool` binaries.
pub trait PoolProvider {
    /// Every pool currently imported, with properties and vdev tree.
    fn list_zpools(&self) -> ZpoolResult<Vec<Zpool>>;

    /// One imported pool by name.
    fn get_zpool(&self, name: &str) -> ZpoolResult<Zpool>;

    /// Pools that can be imported, followed by importable destroyed pools.
    /// An empty list is a normal outcome.
    fn list_exported(&self) -> ZpoolResult<Vec<ExportedZpool>>;

    /// Import `pool` without mounting its datasets.
    fn import_exported(&self, pool: &ExportedZpool, try_force: bool) -> ZpoolResult<()>;
}
