//! System-backed `PoolProvider` implementation. It shells out to the
//! platform `zpool` binary and parses what it prints.

use crate::command::{CommandRunner, Output};
use crate::parse::{
    parse_exported_pools, parse_pool_names, parse_property_line, parse_status_vdevs,
};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zpoolkit_core::config::ZpoolkitConfig;
use zpoolkit_core::error::{ZpoolError, ZpoolResult};
use zpoolkit_core::pool::{
    DevPathResolver, DeviceResolver, ExportedZpool, PassthroughResolver, Zpool,
};
use zpoolkit_core::provider::PoolProvider;

/// Default locations searched when looking for a `zpool` binary on the host.
pub const DEFAULT_ZPOOL_PATHS: &[&str] = &[
    "/sbin/zpool",
    "/usr/sbin/zpool",
    "/usr/local/sbin/zpool",
    "/bin/zpool",
];

/// Properties requested from `zpool get` for an imported pool.
const ZPOOL_PROPERTIES: &str =
    "name,health,allocated,size,free,readonly,dedupratio,fragmentation,freeing,leaked";

/// What `zpool import` prints when there is nothing to import.
const NO_POOLS_AVAILABLE: &str = "no pools available to import";

/// `PoolProvider` that shells out to the native `zpool` CLI.
#[derive(Clone)]
pub struct SystemZpoolProvider {
    runner: CommandRunner,
    resolver: Arc<dyn DeviceResolver + Send + Sync>,
    include_destroyed: bool,
}

impl SystemZpoolProvider {
    /// Build a provider from the user configuration, falling back to discovery.
    pub fn from_config(config: &ZpoolkitConfig) -> ZpoolResult<Self> {
        let timeout = config.zpool_timeout();
        let runner = match config.zpool_binary_path() {
            Some(path) => Self::runner_with_path(path, timeout)?,
            None => Self::discover_zpool(timeout)?,
        };
        let resolver: Arc<dyn DeviceResolver + Send + Sync> = if config.import.resolve_devices {
            Arc::new(DevPathResolver)
        } else {
            Arc::new(PassthroughResolver)
        };

        Ok(Self {
            runner,
            resolver,
            include_destroyed: config.import.include_destroyed,
        })
    }

    /// Construct a provider around an explicit `zpool` binary.
    pub fn with_path(path: PathBuf, timeout: Duration) -> ZpoolResult<Self> {
        Ok(Self {
            runner: Self::runner_with_path(path, timeout)?,
            resolver: Arc::new(DevPathResolver),
            include_destroyed: true,
        })
    }

    /// Auto-discover the binary using `DEFAULT_ZPOOL_PATHS`.
    pub fn discover(timeout: Duration) -> ZpoolResult<Self> {
        Ok(Self {
            runner: Self::discover_zpool(timeout)?,
            resolver: Arc::new(DevPathResolver),
            include_destroyed: true,
        })
    }

    /// Swap the device-name resolver.
    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: DeviceResolver + Send + Sync + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Toggle the `zpool import -D` pass when listing importable pools.
    pub fn include_destroyed(mut self, include: bool) -> Self {
        self.include_destroyed = include;
        self
    }

    fn runner_with_path(path: PathBuf, timeout: Duration) -> ZpoolResult<CommandRunner> {
        if !path.exists() {
            return Err(ZpoolError::InvalidConfig(format!(
                "binary not found at {}",
                path.display()
            )));
        }
        Ok(CommandRunner::new(path, timeout))
    }

    fn discover_zpool(timeout: Duration) -> ZpoolResult<CommandRunner> {
        for candidate in DEFAULT_ZPOOL_PATHS {
            let p = Path::new(candidate);
            if p.exists() {
                return Self::runner_with_path(p.to_path_buf(), timeout);
            }
        }
        Err(ZpoolError::InvalidConfig(format!(
            "unable to locate zpool binary; tried {:?}",
            DEFAULT_ZPOOL_PATHS
        )))
    }

    /// Run `zpool` and turn non-zero exits into descriptive errors.
    fn run_checked(&self, args: &[&str]) -> ZpoolResult<Output> {
        let out = self.runner.run(args)?;
        if !out.success() {
            return Err(Self::classify_cli_error(self.runner.binary(), args, &out));
        }
        Ok(out)
    }

    /// Run `zpool` and return tokenized stdout.
    fn run_lines(&self, args: &[&str]) -> ZpoolResult<Vec<Vec<String>>> {
        Ok(self.run_checked(args)?.lines())
    }

    /// Map CLI output into the right `ZpoolError` bucket with context.
    fn classify_cli_error(binary: &Path, args: &[&str], output: &Output) -> ZpoolError {
        let diagnostic = output.diagnostic();
        let diagnostic_lower = diagnostic.to_ascii_lowercase();

        if diagnostic_lower.contains("no such pool")
            || diagnostic_lower.contains("pool does not exist")
        {
            return ZpoolError::PoolNotFound(format!(
                "{} {}: {}",
                binary.display(),
                args.join(" "),
                diagnostic
            ));
        }

        ZpoolError::Command(format!(
            "{} {} exited with code {}: {}",
            binary.display(),
            args.join(" "),
            output.status,
            if diagnostic.is_empty() {
                "no additional output"
            } else {
                diagnostic
            }
        ))
    }

    /// Run one `zpool import` report and parse every block in it.
    fn importable_report(&self, args: &[&str]) -> ZpoolResult<Vec<ExportedZpool>> {
        let out = self.runner.run(args)?;
        if !out.success() {
            if out.diagnostic().contains(NO_POOLS_AVAILABLE) {
                warn!("zpool {}: {}", args.join(" "), NO_POOLS_AVAILABLE);
                return Ok(Vec::new());
            }
            return Err(Self::classify_cli_error(self.runner.binary(), args, &out));
        }
        let pools = parse_exported_pools(&out.lines(), self.resolver.as_ref());
        debug!("zpool {} reported {} pool(s)", args.join(" "), pools.len());
        Ok(pools)
    }
}

impl PoolProvider for SystemZpoolProvider {
    fn list_zpools(&self) -> ZpoolResult<Vec<Zpool>> {
        let names = parse_pool_names(&self.run_lines(&["list", "-Ho", "name"])?);
        names.iter().map(|name| self.get_zpool(name)).collect()
    }

    /// Combine `zpool get -Hp` properties with the `zpool status -P` tree.
    fn get_zpool(&self, name: &str) -> ZpoolResult<Zpool> {
        let mut pool = Zpool {
            name: name.to_string(),
            ..Zpool::default()
        };
        for line in self.run_lines(&["get", "-Hp", ZPOOL_PROPERTIES, name])? {
            parse_property_line(&mut pool, &line)?;
        }

        let status = self.run_lines(&["status", "-P", name])?;
        pool.vdevs = parse_status_vdevs(name, &status, self.resolver.as_ref());
        Ok(pool)
    }

    fn list_exported(&self) -> ZpoolResult<Vec<ExportedZpool>> {
        let mut pools = self.importable_report(&["import"])?;
        if self.include_destroyed {
            pools.extend(self.importable_report(&["import", "-D"])?);
        }
        Ok(pools)
    }

    fn import_exported(&self, pool: &ExportedZpool, try_force: bool) -> ZpoolResult<()> {
        let args = pool.import_args(try_force);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)?;
        debug!("imported pool {} ({})", pool.name, pool.import_target());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, status: i32) -> Output {
        Output {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status,
        }
    }

    #[test]
    fn classify_missing_pool() {
        let out = output("", "cannot open 'nope': no such pool\n", 1);
        let err = SystemZpoolProvider::classify_cli_error(
            Path::new("/sbin/zpool"),
            &["status", "-P", "nope"],
            &out,
        );
        assert!(matches!(err, ZpoolError::PoolNotFound(_)), "{:?}", err);
    }

    #[test]
    fn classify_generic_failure_keeps_diagnostic() {
        let out = output("", "cannot import 'tank': pool was previously in use\n", 1);
        let err = SystemZpoolProvider::classify_cli_error(
            Path::new("/sbin/zpool"),
            &["import", "-N", "42"],
            &out,
        );
        match err {
            ZpoolError::Command(msg) => {
                assert!(msg.contains("import -N 42"), "{}", msg);
                assert!(msg.contains("exited with code 1"), "{}", msg);
                assert!(msg.contains("previously in use"), "{}", msg);
            }
            other => panic!("expected Command error, got {:?}", other),
        }
    }

    #[test]
    fn classify_silent_failure() {
        let out = output("", "", 2);
        let err =
            SystemZpoolProvider::classify_cli_error(Path::new("/sbin/zpool"), &["list"], &out);
        assert!(err.to_string().contains("no additional output"));
    }

    #[test]
    fn missing_binary_is_invalid_config() {
        let err = SystemZpoolProvider::with_path(
            PathBuf::from("/nonexistent/zpool"),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ZpoolError::InvalidConfig(_)));
    }
}
