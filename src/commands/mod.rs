pub mod init;
pub mod ledger;
pub mod plan;
pub mod provision;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::{CommonArgs, TargetKind};
use crate::compat::CompatTable;
use crate::config::{load_config, KilnConfig};
use crate::ledger::default_ledger_path;
use crate::plan::{build_plan, Plan};
use crate::variant::VariantDescriptor;
use crate::xdg;

const COMPAT_FILE_NAME: &str = "compat.toml";

/// Everything a plan-consuming command needs, loaded once.
pub(crate) struct LoadedContext {
    pub config: KilnConfig,
    pub descriptor: VariantDescriptor,
    pub plan: Plan,
}

pub(crate) fn load_context(common: &CommonArgs) -> Result<LoadedContext> {
    let config = load_config(common.config.as_deref())?;

    let descriptor = VariantDescriptor::from_file(Path::new(&common.descriptor))?;

    let table_path = common
        .compat_table
        .clone()
        .or_else(|| config.compat.table.clone())
        .unwrap_or_else(|| COMPAT_FILE_NAME.to_string());
    let table = CompatTable::from_file(Path::new(&table_path)).with_context(|| {
        format!("No usable compatibility table at '{table_path}' (run `kiln init` for a starter)")
    })?;

    let plan = build_plan(&descriptor, &table, &config.extra_steps)?;

    Ok(LoadedContext {
        config,
        descriptor,
        plan,
    })
}

/// Resolve the ledger file for a (descriptor, target) pair: explicit path
/// if given, otherwise one file per target under the ledger directory.
pub(crate) fn resolve_ledger_path(
    explicit: Option<&str>,
    config: &KilnConfig,
    descriptor: &VariantDescriptor,
    target: TargetKind,
) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    let dir = config
        .ledger
        .dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(xdg::ledger_dir);
    let target_name = match target {
        TargetKind::Local => "local",
        TargetKind::Script => "script",
    };
    default_ledger_path(&dir, &descriptor.base_image, target_name)
}
