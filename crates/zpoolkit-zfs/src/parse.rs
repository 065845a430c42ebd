//! Helpers for turning `zpool` CLI output into pool records.
//!
//! Everything here works on the tokenized lines `command::Output::lines`
//! produces: one `Vec<String>` per physical line, with blank lines kept as
//! empty vectors so line counts stay aligned with the report.

use zpoolkit_core::error::{ZpoolError, ZpoolResult};
use zpoolkit_core::pool::{
    is_vdev_group, set_once, DeviceResolver, ExportedZpool, Vdev, VdevGroup, Zpool,
};

/// Header keys recognized inside an importable-pool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    State,
    Status,
    Action,
    See,
}

/// One line of a `zpool import` report, classified by its first token.
#[derive(Debug, PartialEq, Eq)]
enum ReportLine<'a> {
    Blank,
    PoolStart,
    Field(Field, String),
    /// `config:` opens the device tree.
    Config,
    /// `NAME STATE ...` column titles some tool versions print.
    ColumnHeader,
    /// The pool name repeated as the root of the device tree.
    PoolEcho,
    /// Free text or a device-tree row; the scanner decides which.
    Body(&'a [String]),
}

impl<'a> ReportLine<'a> {
    fn classify(line: &'a [String], pool_name: &str) -> Self {
        let Some(first) = line.first() else {
            return ReportLine::Blank;
        };
        let field = match first.as_str() {
            "pool:" => return ReportLine::PoolStart,
            "config:" => return ReportLine::Config,
            "NAME" if line.get(1).is_some_and(|t| t == "STATE") => {
                return ReportLine::ColumnHeader
            }
            "id:" => Field::Id,
            "state:" => Field::State,
            "status:" => Field::Status,
            "action:" => Field::Action,
            "see:" => Field::See,
            name if name == pool_name => return ReportLine::PoolEcho,
            _ => return ReportLine::Body(line),
        };
        ReportLine::Field(field, line[1..].join(" "))
    }
}

/// A device-tree row: either a group header or a device.
#[derive(Debug, PartialEq, Eq)]
enum TreeLine<'a> {
    Group { name: &'a str, health: &'a str },
    Device { name: &'a str, health: &'a str },
}

impl<'a> TreeLine<'a> {
    fn classify(line: &'a [String]) -> Option<Self> {
        let name = line.first()?.as_str();
        let health = line.get(1).map(String::as_str).unwrap_or("");
        if is_vdev_group(name) {
            Some(TreeLine::Group { name, health })
        } else {
            Some(TreeLine::Device { name, health })
        }
    }
}

/// Places device-tree rows into vdev groups, remembering which group is
/// open by its index in the pool's group list.
struct VdevTreeBuilder<'r> {
    resolver: &'r dyn DeviceResolver,
    current: Option<usize>,
}

impl<'r> VdevTreeBuilder<'r> {
    fn new(resolver: &'r dyn DeviceResolver) -> Self {
        Self {
            resolver,
            current: None,
        }
    }

    fn place(&mut self, vdevs: &mut Vec<VdevGroup>, line: &[String]) {
        match TreeLine::classify(line) {
            Some(TreeLine::Group { name, health }) => {
                vdevs.push(VdevGroup::new(self.resolver.resolve(name), health));
                self.current = Some(vdevs.len() - 1);
            }
            Some(TreeLine::Device { name, health }) => {
                let idx = match self.current {
                    Some(idx) => idx,
                    None => {
                        vdevs.push(VdevGroup::ungrouped());
                        let idx = vdevs.len() - 1;
                        self.current = Some(idx);
                        idx
                    }
                };
                vdevs[idx].devices.push(Vdev {
                    name: self.resolver.resolve(name),
                    health: health.to_string(),
                });
            }
            None => {}
        }
    }
}

/// Fill `pool` from the lines that follow its `pool:` marker.
///
/// Returns how many lines were consumed: the index of the next `pool:`
/// marker relative to `lines`, or `lines.len()` when the report ends first.
pub(crate) fn parse_exported_block(
    pool: &mut ExportedZpool,
    lines: &[Vec<String>],
    resolver: &dyn DeviceResolver,
) -> usize {
    let mut tree = VdevTreeBuilder::new(resolver);
    let mut continuation = false;

    for (loc, line) in lines.iter().enumerate() {
        match ReportLine::classify(line, &pool.name) {
            ReportLine::Blank | ReportLine::PoolEcho | ReportLine::ColumnHeader => {}
            ReportLine::PoolStart => return loc,
            ReportLine::Config => continuation = false,
            ReportLine::Field(field, value) => {
                let slot = match field {
                    Field::Id => &mut pool.id,
                    Field::State => &mut pool.state,
                    Field::Status => &mut pool.status,
                    Field::Action => &mut pool.action,
                    Field::See => &mut pool.see,
                };
                set_once(slot, value);
                if field == Field::Action {
                    continuation = true;
                }
            }
            ReportLine::Body(tokens) if continuation => {
                let tail = tokens.join(" ");
                pool.action = Some(match pool.action.take() {
                    Some(action) => format!("{} {}", action, tail),
                    None => tail,
                });
                continuation = false;
            }
            ReportLine::Body(tokens) => tree.place(&mut pool.vdevs, tokens),
        }
    }
    lines.len()
}

/// Parse a full `zpool import` report into one record per `pool:` block,
/// in report order. A report without blocks yields an empty list.
pub(crate) fn parse_exported_pools(
    lines: &[Vec<String>],
    resolver: &dyn DeviceResolver,
) -> Vec<ExportedZpool> {
    let mut pools = Vec::new();
    let mut cursor = 0;
    while cursor < lines.len() {
        let line = &lines[cursor];
        if line.first().map(String::as_str) != Some("pool:") {
            cursor += 1;
            continue;
        }

        let mut pool = ExportedZpool::new(line.get(1).cloned().unwrap_or_default());
        let body = &lines[cursor + 1..];
        let consumed = parse_exported_block(&mut pool, body, resolver);
        pools.push(pool);
        cursor += 1 + consumed;
    }
    pools
}

/// Apply one `zpool get -Hp` row (`name property value source`) to `pool`.
/// Rows with unknown properties or too few columns are skipped.
pub(crate) fn parse_property_line(pool: &mut Zpool, line: &[String]) -> ZpoolResult<()> {
    let (Some(prop), Some(val)) = (line.get(1), line.get(2)) else {
        return Ok(());
    };

    match prop.as_str() {
        "name" => {
            if pool.name.is_empty() {
                pool.name = val.clone();
            }
        }
        "health" => {
            if pool.health.is_empty() {
                pool.health = val.clone();
            }
        }
        "allocated" => pool.allocated = parse_u64(prop, val)?,
        "size" => pool.size = parse_u64(prop, val)?,
        "free" => pool.free = parse_u64(prop, val)?,
        "freeing" => pool.freeing = parse_u64(prop, val)?,
        "leaked" => pool.leaked = parse_u64(prop, val)?,
        "fragmentation" => {
            let val = val.trim_end_matches('%');
            pool.fragmentation = if val == "-" { 0 } else { parse_u64(prop, val)? };
        }
        "readonly" => pool.read_only = val == "on",
        "dedupratio" => {
            let ratio = val.trim_end_matches('x');
            pool.dedup_ratio = ratio.parse::<f64>().map_err(|_| parse_error(prop, val))?;
        }
        _ => {}
    }
    Ok(())
}

fn parse_u64(field: &str, value: &str) -> ZpoolResult<u64> {
    if value == "-" {
        return Ok(0);
    }
    value.parse::<u64>().map_err(|_| parse_error(field, value))
}

fn parse_error(field: &str, value: &str) -> ZpoolError {
    ZpoolError::Parse {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Build the vdev tree from `zpool status -P <pool>` output. Only the
/// `config:` section is read; it ends at `errors:`.
pub(crate) fn parse_status_vdevs(
    pool_name: &str,
    lines: &[Vec<String>],
    resolver: &dyn DeviceResolver,
) -> Vec<VdevGroup> {
    let mut vdevs = Vec::new();
    let mut tree = VdevTreeBuilder::new(resolver);
    let mut in_config = false;

    for line in lines {
        let Some(first) = line.first() else {
            continue;
        };
        if !in_config {
            in_config = first == "config:";
            continue;
        }
        match first.as_str() {
            "errors:" => break,
            "NAME" => continue,
            name if name == pool_name => continue,
            _ => tree.place(&mut vdevs, line),
        }
    }
    vdevs
}

/// Pool names from `zpool list -Ho name`.
pub(crate) fn parse_pool_names(lines: &[Vec<String>]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.first().cloned())
        .collect()
}
