//! Cache key generation for plan steps.
//!
//! A step's key is a deterministic digest of:
//! - The base image the plan targets (plans for different bases never
//!   share ledger entries)
//! - The action kind and every action parameter
//! - The cache keys of the step's direct inputs
//!
//! Because input keys are themselves composed the same way, any upstream
//! parameter change re-keys the entire downstream closure.
//! Format: "step-{hex_hash}" where hex_hash is the first 16 characters of
//! SHA256.

use sha2::{Digest, Sha256};

use super::StepAction;

const SEP: [u8; 1] = [0];

/// Compute the cache key for one step.
pub fn compute_cache_key(base_image: &str, action: &StepAction, input_keys: &[String]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(base_image.as_bytes());
    hasher.update(SEP);
    hasher.update(action.name().as_bytes());
    hasher.update(SEP);
    digest_action(&mut hasher, action);

    for key in input_keys {
        hasher.update(key.as_bytes());
        hasher.update(SEP);
    }

    let hash = hex::encode(hasher.finalize());

    // First 16 characters (64 bits) keep keys short but collision-safe at
    // plan scale.
    format!("step-{}", &hash[..16])
}

fn digest_action(hasher: &mut Sha256, action: &StepAction) {
    match action {
        StepAction::InstallPackageManager {
            distribution,
            prefix,
        } => {
            hasher.update(distribution.binary().as_bytes());
            hasher.update(SEP);
            hasher.update(prefix.as_bytes());
            hasher.update(SEP);
        }
        StepAction::CreateInterpreterEnv {
            distribution,
            env_name,
            python_version,
        } => {
            hasher.update(distribution.binary().as_bytes());
            hasher.update(SEP);
            hasher.update(env_name.as_bytes());
            hasher.update(SEP);
            hasher.update(python_version.as_bytes());
            hasher.update(SEP);
        }
        StepAction::InstallPackages {
            distribution,
            env_name,
            packages,
            channel,
        } => {
            hasher.update(distribution.binary().as_bytes());
            hasher.update(SEP);
            hasher.update(env_name.as_bytes());
            hasher.update(SEP);
            for package in packages {
                hasher.update(package.as_bytes());
                hasher.update(SEP);
            }
            if let Some(channel) = channel {
                hasher.update(channel.as_bytes());
            }
            hasher.update(SEP);
        }
        StepAction::WriteConfigFile { path, contents } => {
            hasher.update(path.as_bytes());
            hasher.update(SEP);
            hasher.update(contents.as_bytes());
            hasher.update(SEP);
        }
        StepAction::RunCommand { program, args } => {
            hasher.update(program.as_bytes());
            hasher.update(SEP);
            for arg in args {
                hasher.update(arg.as_bytes());
                hasher.update(SEP);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Distribution;

    fn install(packages: Vec<&str>) -> StepAction {
        StepAction::InstallPackages {
            distribution: Distribution::Mamba,
            env_name: "kiln".to_string(),
            packages: packages.into_iter().map(String::from).collect(),
            channel: None,
        }
    }

    #[test]
    fn test_deterministic() {
        let action = install(vec!["tensorflow==2.9.*"]);
        let a = compute_cache_key("ubuntu:22.04", &action, &[]);
        let b = compute_cache_key("ubuntu:22.04", &action, &[]);
        assert_eq!(a, b);
        assert!(a.starts_with("step-"));
        assert_eq!(a.len(), "step-".len() + 16);
    }

    #[test]
    fn test_changes_with_parameters() {
        let a = compute_cache_key("ubuntu:22.04", &install(vec!["tensorflow==2.9.*"]), &[]);
        let b = compute_cache_key("ubuntu:22.04", &install(vec!["tensorflow==2.10.*"]), &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_changes_with_base_image() {
        let action = install(vec!["tensorflow==2.9.*"]);
        let a = compute_cache_key("ubuntu:22.04", &action, &[]);
        let b = compute_cache_key("ubuntu:20.04", &action, &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_changes_with_input_keys() {
        let action = install(vec!["tensorflow==2.9.*"]);
        let a = compute_cache_key("ubuntu:22.04", &action, &["step-aaaa".to_string()]);
        let b = compute_cache_key("ubuntu:22.04", &action, &["step-bbbb".to_string()]);
        assert_ne!(a, b);
    }
}
