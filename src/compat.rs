//! Accelerator/framework/interpreter compatibility table.
//!
//! The table is external, versioned TOML consumed by the plan builder: new
//! combinations are added by editing the table, not engine logic. A
//! descriptor pairing with no matching rule is rejected with
//! `IncompatibleConfiguration` before any step is constructed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::variant::VariantDescriptor;

/// Compatibility table loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompatTable {
    #[serde(default)]
    pub schema_version: u32,

    /// Accelerator toolkit profiles (CUDA/cuDNN pairings and the conda
    /// packages that provide them).
    #[serde(default)]
    pub toolkit: Vec<ToolkitProfile>,

    /// Per-(accelerator, framework) support rules.
    #[serde(default)]
    pub rule: Vec<CompatRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitProfile {
    /// Accelerator string this profile provides (e.g., "cuda-11.2").
    pub accelerator: String,

    /// cuDNN version paired with this CUDA release.
    pub cudnn: String,

    /// Conda channel providing the toolkit packages.
    pub channel: String,

    /// Package specs installed into the interpreter environment.
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatRule {
    /// Accelerator string ("none" or "cuda-X.Y") this rule applies to.
    pub accelerator: String,

    /// Framework name as it appears in variant descriptors.
    pub framework: String,

    /// Supported version patterns (exact or trailing-glob, e.g. "2.9.*").
    pub versions: Vec<String>,

    /// Supported Python versions; empty means any.
    #[serde(default)]
    pub python: Vec<String>,

    /// Concrete package to install for this pairing (e.g., "tensorflow"
    /// vs "tensorflow-gpu").
    pub package: String,

    /// Conda channel to install from; pip when absent.
    #[serde(default)]
    pub channel: Option<String>,
}

/// A framework entry resolved against the table: the concrete package and
/// channel to install for the requested constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFramework {
    pub name: String,
    pub constraint: String,
    pub package: String,
    pub channel: Option<String>,
}

impl CompatTable {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read compatibility table: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse compatibility table: {}", path.display()))
    }

    /// Toolkit profile for an accelerator string, if the table knows it.
    pub fn toolkit_for(&self, accelerator: &str) -> Option<&ToolkitProfile> {
        self.toolkit.iter().find(|t| t.accelerator == accelerator)
    }

    /// Validate a descriptor and resolve each requested framework to the
    /// concrete package/channel for its accelerator profile.
    ///
    /// Fails with `IncompatibleConfiguration` on the first pairing the
    /// table does not support.
    pub fn resolve(
        &self,
        descriptor: &VariantDescriptor,
    ) -> Result<Vec<ResolvedFramework>, EngineError> {
        let accelerator = descriptor.accelerator.to_string();

        if descriptor.accelerator != crate::variant::Accelerator::None
            && self.toolkit_for(&accelerator).is_none()
        {
            return Err(EngineError::IncompatibleConfiguration(format!(
                "no toolkit profile for accelerator '{accelerator}'"
            )));
        }

        let python = &descriptor.interpreter.version;
        let mut resolved = Vec::with_capacity(descriptor.frameworks.len());

        for (name, constraint) in &descriptor.frameworks {
            let rule = self
                .rule
                .iter()
                .find(|r| {
                    r.accelerator == accelerator
                        && &r.framework == name
                        && r.versions.iter().any(|v| version_matches(v, constraint))
                })
                .ok_or_else(|| {
                    EngineError::IncompatibleConfiguration(format!(
                        "{name} {constraint} is not supported on accelerator '{accelerator}'"
                    ))
                })?;

            if !rule.python.is_empty() && !rule.python.iter().any(|p| version_matches(p, python)) {
                return Err(EngineError::IncompatibleConfiguration(format!(
                    "{name} {constraint} on '{accelerator}' requires python {:?}, got {python}",
                    rule.python
                )));
            }

            resolved.push(ResolvedFramework {
                name: name.clone(),
                constraint: constraint.clone(),
                package: rule.package.clone(),
                channel: rule.channel.clone(),
            });
        }

        Ok(resolved)
    }
}

/// Match a requested version string against a supported pattern.
///
/// Patterns are exact ("2.9.1") or trailing-glob ("2.9.*"). A glob pattern
/// covers the prefix itself, any deeper component, and the equivalent
/// requested glob ("2.9.*" covers "2.9", "2.9.1", and "2.9.*").
pub fn version_matches(pattern: &str, requested: &str) -> bool {
    if pattern == requested {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        if let Some(rest) = requested.strip_prefix(prefix) {
            return rest.is_empty() || rest.starts_with('.');
        }
    }
    false
}
