pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod provider;

pub use config::{ImportCfg, LogCfg, LogFormat, ZpoolCfg, ZpoolkitConfig};
pub use error::{ZpoolError, ZpoolResult};
pub use pool::{DeviceResolver, ExportedZpool, Vdev, VdevGroup, Zpool};
pub use provider::PoolProvider;
