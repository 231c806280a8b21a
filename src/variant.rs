//! Variant descriptor types.
//!
//! A variant descriptor selects one environment to build: base image,
//! accelerator profile, interpreter distribution/version, framework set,
//! and notebook front end. Descriptors are loaded from TOML files and
//! validated against the compatibility table by the plan builder.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration record selecting which environment to provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Identifier of the starting filesystem/toolchain (e.g., "ubuntu:22.04").
    pub base_image: String,

    /// Accelerator profile ("none" or "cuda-X.Y").
    #[serde(default)]
    pub accelerator: Accelerator,

    pub interpreter: Interpreter,

    /// Framework name -> version constraint (e.g., tensorflow = "2.9.*").
    /// BTreeMap keeps framework expansion order deterministic.
    #[serde(default)]
    pub frameworks: BTreeMap<String, String>,

    #[serde(default)]
    pub notebook_frontend: NotebookFrontend,
}

impl VariantDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read variant descriptor: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse variant descriptor: {}", path.display()))
    }
}

/// GPU toolkit/driver compatibility identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Accelerator {
    #[default]
    None,
    /// CUDA profile, e.g. "cuda-11.2". The cuDNN pairing comes from the
    /// compatibility table, not the descriptor.
    Cuda {
        version: String,
    },
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::None => write!(f, "none"),
            Accelerator::Cuda { version } => write!(f, "cuda-{version}"),
        }
    }
}

impl TryFrom<String> for Accelerator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "none" {
            return Ok(Accelerator::None);
        }
        if let Some(version) = value.strip_prefix("cuda-") {
            if !version.is_empty() {
                return Ok(Accelerator::Cuda {
                    version: version.to_string(),
                });
            }
        }
        Err(format!(
            "unknown accelerator '{value}' (expected 'none' or 'cuda-X.Y')"
        ))
    }
}

impl From<Accelerator> for String {
    fn from(value: Accelerator) -> Self {
        value.to_string()
    }
}

/// Interpreter toolchain: package-manager distribution plus Python version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpreter {
    pub distribution: Distribution,
    /// Python version (e.g., "3.9").
    pub version: String,
}

/// Package-manager distribution bootstrapped into the target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Conda,
    Mamba,
}

impl Distribution {
    /// Binary name the package manager is invoked as once installed.
    pub fn binary(&self) -> &'static str {
        match self {
            Distribution::Conda => "conda",
            Distribution::Mamba => "mamba",
        }
    }

    /// Self-contained installer for the distribution.
    pub fn installer_url(&self) -> &'static str {
        match self {
            Distribution::Conda => {
                "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh"
            }
            Distribution::Mamba => {
                "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-Linux-x86_64.sh"
            }
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Notebook front end installed on top of the interpreter environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotebookFrontend {
    #[default]
    None,
    Classic,
    Lab,
}

impl NotebookFrontend {
    /// Package providing the front end, if any.
    pub fn package(&self) -> Option<&'static str> {
        match self {
            NotebookFrontend::None => None,
            NotebookFrontend::Classic => Some("notebook"),
            NotebookFrontend::Lab => Some("jupyterlab"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerator_parse_roundtrip() {
        assert_eq!(
            Accelerator::try_from("none".to_string()).unwrap(),
            Accelerator::None
        );
        let cuda = Accelerator::try_from("cuda-11.2".to_string()).unwrap();
        assert_eq!(
            cuda,
            Accelerator::Cuda {
                version: "11.2".to_string()
            }
        );
        assert_eq!(cuda.to_string(), "cuda-11.2");
    }

    #[test]
    fn test_accelerator_rejects_garbage() {
        assert!(Accelerator::try_from("cuda-".to_string()).is_err());
        assert!(Accelerator::try_from("rocm-5.4".to_string()).is_err());
    }

    #[test]
    fn test_descriptor_parses_from_toml() {
        let descriptor: VariantDescriptor = toml::from_str(
            r#"
            base_image = "ubuntu:22.04"
            accelerator = "cuda-11.2"
            notebook_frontend = "lab"

            [interpreter]
            distribution = "mamba"
            version = "3.9"

            [frameworks]
            tensorflow = "2.9.*"
            "#,
        )
        .unwrap();

        assert_eq!(descriptor.base_image, "ubuntu:22.04");
        assert_eq!(
            descriptor.accelerator,
            Accelerator::Cuda {
                version: "11.2".to_string()
            }
        );
        assert_eq!(descriptor.interpreter.distribution, Distribution::Mamba);
        assert_eq!(descriptor.frameworks["tensorflow"], "2.9.*");
        assert_eq!(descriptor.notebook_frontend, NotebookFrontend::Lab);
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: VariantDescriptor = toml::from_str(
            r#"
            base_image = "minimal"

            [interpreter]
            distribution = "conda"
            version = "3.10"
            "#,
        )
        .unwrap();

        assert_eq!(descriptor.accelerator, Accelerator::None);
        assert!(descriptor.frameworks.is_empty());
        assert_eq!(descriptor.notebook_frontend, NotebookFrontend::None);
    }
}
