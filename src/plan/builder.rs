//! Plan builder.
//!
//! Expands a variant descriptor into a dependency graph of steps and
//! linearizes it with a deterministic topological sort. Pure: no side
//! effects, no environment access.
//!
//! Expansion order: package-manager bootstrap -> interpreter environment
//! creation -> accelerator toolkit install -> framework installs ->
//! notebook front end install -> notebook config write -> extension steps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::cache_key::compute_cache_key;
use super::{Plan, Step, StepAction, StepId};
use crate::compat::CompatTable;
use crate::errors::EngineError;
use crate::variant::{Accelerator, NotebookFrontend, VariantDescriptor};

/// Prefix the package manager installer unpacks into.
const MANAGER_PREFIX: &str = "/opt/conda";

/// Name of the interpreter environment steps install into.
const ENV_NAME: &str = "kiln";

/// Caller-supplied step appended to the generated plan (declared as
/// `[[extra_steps]]` in kiln.toml). Runs after the steps named in `after`,
/// or after the last engine-generated step when `after` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionStep {
    pub id: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
    /// Raw commands are non-idempotent unless declared otherwise.
    #[serde(default)]
    pub idempotent: bool,
}

struct Node {
    id: StepId,
    action: StepAction,
    inputs: Vec<StepId>,
    idempotent: bool,
}

/// Build the ordered step sequence for a descriptor.
///
/// Validates the descriptor against the compatibility table before any
/// step is constructed, then topologically sorts the expanded graph (ties
/// broken by declaration order). The graph is a DAG by construction;
/// malformed extension edges surface as `CyclicDependency`.
pub fn build_plan(
    descriptor: &VariantDescriptor,
    table: &CompatTable,
    extensions: &[ExtensionStep],
) -> Result<Plan, EngineError> {
    let resolved = table.resolve(descriptor)?;

    let distribution = descriptor.interpreter.distribution;
    let mut nodes: Vec<Node> = Vec::new();

    let bootstrap_id = StepId::from("bootstrap-package-manager");
    nodes.push(Node {
        id: bootstrap_id.clone(),
        action: StepAction::InstallPackageManager {
            distribution,
            prefix: MANAGER_PREFIX.to_string(),
        },
        inputs: vec![],
        idempotent: true,
    });

    let env_id = StepId::from("create-interpreter-env");
    nodes.push(Node {
        id: env_id.clone(),
        action: StepAction::CreateInterpreterEnv {
            distribution,
            env_name: ENV_NAME.to_string(),
            python_version: descriptor.interpreter.version.clone(),
        },
        inputs: vec![bootstrap_id],
        idempotent: true,
    });

    let toolkit_id = match &descriptor.accelerator {
        Accelerator::None => None,
        accelerator => {
            // resolve() already guaranteed the profile exists.
            let profile = table
                .toolkit_for(&accelerator.to_string())
                .ok_or_else(|| {
                    EngineError::IncompatibleConfiguration(format!(
                        "no toolkit profile for accelerator '{accelerator}'"
                    ))
                })?;
            let id = StepId::from("install-accelerator-toolkit");
            nodes.push(Node {
                id: id.clone(),
                action: StepAction::InstallPackages {
                    distribution,
                    env_name: ENV_NAME.to_string(),
                    packages: profile.packages.clone(),
                    channel: Some(profile.channel.clone()),
                },
                inputs: vec![env_id.clone()],
                idempotent: true,
            });
            Some(id)
        }
    };

    let mut framework_ids = Vec::new();
    for framework in &resolved {
        let mut inputs = vec![env_id.clone()];
        if let Some(toolkit) = &toolkit_id {
            inputs.push(toolkit.clone());
        }
        let id = StepId::new(format!("install-{}", framework.name));
        nodes.push(Node {
            id: id.clone(),
            action: StepAction::InstallPackages {
                distribution,
                env_name: ENV_NAME.to_string(),
                packages: vec![format!("{}=={}", framework.package, framework.constraint)],
                channel: framework.channel.clone(),
            },
            inputs,
            idempotent: true,
        });
        framework_ids.push(id);
    }

    if let Some(package) = descriptor.notebook_frontend.package() {
        // The front end installs after the frameworks so its cache key sits
        // downstream of every framework version.
        let mut inputs = vec![env_id.clone()];
        if let Some(toolkit) = &toolkit_id {
            inputs.push(toolkit.clone());
        }
        inputs.extend(framework_ids.iter().cloned());

        let frontend_id = StepId::from("install-notebook-frontend");
        nodes.push(Node {
            id: frontend_id.clone(),
            action: StepAction::InstallPackages {
                distribution,
                env_name: ENV_NAME.to_string(),
                packages: vec![package.to_string()],
                channel: None,
            },
            inputs,
            idempotent: true,
        });

        nodes.push(Node {
            id: StepId::from("write-notebook-config"),
            action: StepAction::WriteConfigFile {
                path: notebook_config_path(descriptor.notebook_frontend).to_string(),
                contents: notebook_config(descriptor.notebook_frontend),
            },
            inputs: vec![frontend_id],
            idempotent: true,
        });
    }

    let last_generated = nodes
        .last()
        .map(|n| n.id.clone())
        .unwrap_or_else(|| StepId::from("bootstrap-package-manager"));

    for extension in extensions {
        let id = StepId::new(extension.id.clone());
        if nodes.iter().any(|n| n.id == id) {
            return Err(EngineError::IncompatibleConfiguration(format!(
                "extension step id '{id}' collides with an existing step"
            )));
        }
        let inputs = if extension.after.is_empty() {
            vec![last_generated.clone()]
        } else {
            extension.after.iter().map(|a| StepId::from(a.as_str())).collect()
        };
        nodes.push(Node {
            id,
            action: StepAction::RunCommand {
                program: extension.program.clone(),
                args: extension.args.clone(),
            },
            inputs,
            idempotent: extension.idempotent,
        });
    }

    let order = topo_sort(&nodes)?;

    // Assign cache keys in topological order so every input key exists
    // before it is composed into a successor.
    let mut keys: HashMap<StepId, String> = HashMap::with_capacity(nodes.len());
    let mut steps = Vec::with_capacity(nodes.len());
    for index in order {
        let node = &nodes[index];
        let input_keys: Vec<String> = node
            .inputs
            .iter()
            .map(|input| keys[input].clone())
            .collect();
        let cache_key = compute_cache_key(&descriptor.base_image, &node.action, &input_keys);
        keys.insert(node.id.clone(), cache_key.clone());
        steps.push(Step {
            id: node.id.clone(),
            action: node.action.clone(),
            inputs: node.inputs.clone(),
            cache_key,
            idempotent: node.idempotent,
        });
    }

    Ok(Plan { steps })
}

/// Deterministic Kahn topological sort, ties broken by declaration order.
fn topo_sort(nodes: &[Node]) -> Result<Vec<usize>, EngineError> {
    let index_of: HashMap<&StepId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.id, i))
        .collect();

    let mut indegree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        for input in &node.inputs {
            let from = *index_of.get(input).ok_or_else(|| {
                EngineError::IncompatibleConfiguration(format!(
                    "step '{}' depends on unknown step '{input}'",
                    node.id
                ))
            })?;
            successors[from].push(i);
            indegree[i] += 1;
        }
    }

    // Ready set kept sorted by declaration index: the smallest ready node
    // always runs next, so equal graphs always linearize identically.
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while !ready.is_empty() {
        ready.sort_unstable();
        let next = ready.remove(0);
        order.push(next);
        for &succ in &successors[next] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.push(succ);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = indegree
            .iter()
            .position(|&d| d > 0)
            .map(|i| nodes[i].id.clone())
            .unwrap_or_else(|| StepId::from("unknown"));
        return Err(EngineError::CyclicDependency(stuck));
    }

    Ok(order)
}

/// Classic notebook reads `jupyter_notebook_config.py`; the server-based
/// front ends read `jupyter_server_config.py`.
fn notebook_config_path(frontend: NotebookFrontend) -> &'static str {
    match frontend {
        NotebookFrontend::Classic => "~/.jupyter/jupyter_notebook_config.py",
        _ => "~/.jupyter/jupyter_server_config.py",
    }
}

fn notebook_config(frontend: NotebookFrontend) -> String {
    let app = match frontend {
        NotebookFrontend::Classic => "NotebookApp",
        _ => "ServerApp",
    };
    format!(
        "c = get_config()\n\
         c.{app}.ip = \"0.0.0.0\"\n\
         c.{app}.open_browser = False\n\
         c.{app}.allow_root = True\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{Distribution, Interpreter};
    use std::collections::BTreeMap;

    fn table() -> CompatTable {
        toml::from_str(
            r#"
            [[toolkit]]
            accelerator = "cuda-11.2"
            cudnn = "8.1"
            channel = "nvidia"
            packages = ["cudatoolkit=11.2", "cudnn=8.1"]

            [[rule]]
            accelerator = "none"
            framework = "tensorflow"
            versions = ["2.9.*", "2.10.*"]
            package = "tensorflow"

            [[rule]]
            accelerator = "cuda-11.2"
            framework = "tensorflow"
            versions = ["2.9.*"]
            package = "tensorflow-gpu"

            [[rule]]
            accelerator = "none"
            framework = "pytorch"
            versions = ["2.*"]
            package = "torch"
            "#,
        )
        .unwrap()
    }

    fn descriptor() -> VariantDescriptor {
        let mut frameworks = BTreeMap::new();
        frameworks.insert("tensorflow".to_string(), "2.9.*".to_string());
        VariantDescriptor {
            base_image: "minimal".to_string(),
            accelerator: Accelerator::None,
            interpreter: Interpreter {
                distribution: Distribution::Mamba,
                version: "3.9".to_string(),
            },
            frameworks,
            notebook_frontend: NotebookFrontend::Lab,
        }
    }

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_minimal_lab_plan_shape() {
        let plan = build_plan(&descriptor(), &table(), &[]).unwrap();
        assert_eq!(
            ids(&plan),
            vec![
                "bootstrap-package-manager",
                "create-interpreter-env",
                "install-tensorflow",
                "install-notebook-frontend",
                "write-notebook-config",
            ]
        );
    }

    #[test]
    fn test_inputs_always_precede() {
        let mut descriptor = descriptor();
        descriptor.accelerator = Accelerator::Cuda {
            version: "11.2".to_string(),
        };

        let plan = build_plan(&descriptor, &table(), &[]).unwrap();
        for (position, step) in plan.steps.iter().enumerate() {
            for input in &step.inputs {
                let input_position = plan
                    .steps
                    .iter()
                    .position(|s| &s.id == input)
                    .expect("input present in plan");
                assert!(input_position < position, "{input} after {}", step.id);
            }
        }
    }

    #[test]
    fn test_gpu_plan_includes_toolkit_before_frameworks() {
        let mut descriptor = descriptor();
        descriptor.accelerator = Accelerator::Cuda {
            version: "11.2".to_string(),
        };
        let plan = build_plan(&descriptor, &table(), &[]).unwrap();
        let ids = ids(&plan);
        let toolkit = ids
            .iter()
            .position(|id| *id == "install-accelerator-toolkit")
            .unwrap();
        let framework = ids.iter().position(|id| *id == "install-tensorflow").unwrap();
        assert!(toolkit < framework);
    }

    #[test]
    fn test_incompatible_descriptor_yields_no_steps() {
        let mut descriptor = descriptor();
        descriptor
            .frameworks
            .insert("tensorflow".to_string(), "1.15".to_string());
        let err = build_plan(&descriptor, &table(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleConfiguration(_)));
    }

    #[test]
    fn test_framework_version_bump_rekeys_downstream_only() {
        let before = build_plan(&descriptor(), &table(), &[]).unwrap();

        let mut changed = descriptor();
        changed
            .frameworks
            .insert("tensorflow".to_string(), "2.10.*".to_string());
        let after = build_plan(&changed, &table(), &[]).unwrap();

        let key = |plan: &Plan, id: &str| plan.step(&StepId::from(id)).unwrap().cache_key.clone();

        assert_eq!(
            key(&before, "bootstrap-package-manager"),
            key(&after, "bootstrap-package-manager")
        );
        assert_eq!(
            key(&before, "create-interpreter-env"),
            key(&after, "create-interpreter-env")
        );
        assert_ne!(
            key(&before, "install-tensorflow"),
            key(&after, "install-tensorflow")
        );
        assert_ne!(
            key(&before, "install-notebook-frontend"),
            key(&after, "install-notebook-frontend")
        );
        assert_ne!(
            key(&before, "write-notebook-config"),
            key(&after, "write-notebook-config")
        );
    }

    #[test]
    fn test_extension_steps_run_after_generated_plan() {
        let extensions = vec![ExtensionStep {
            id: "warm-dataset-cache".to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "true".to_string()],
            after: vec![],
            idempotent: false,
        }];
        let plan = build_plan(&descriptor(), &table(), &extensions).unwrap();
        let last = plan.steps.last().unwrap();
        assert_eq!(last.id.as_str(), "warm-dataset-cache");
        assert_eq!(last.inputs, vec![StepId::from("write-notebook-config")]);
        assert!(!last.idempotent);
    }

    #[test]
    fn test_notebook_config_path_follows_frontend() {
        let config_action = |frontend: NotebookFrontend| {
            let mut descriptor = descriptor();
            descriptor.notebook_frontend = frontend;
            let plan = build_plan(&descriptor, &table(), &[]).unwrap();
            plan.step(&StepId::from("write-notebook-config"))
                .unwrap()
                .action
                .clone()
        };

        match config_action(NotebookFrontend::Classic) {
            StepAction::WriteConfigFile { path, contents } => {
                assert_eq!(path, "~/.jupyter/jupyter_notebook_config.py");
                assert!(contents.contains("c.NotebookApp.ip"));
            }
            other => panic!("expected config write, got {other:?}"),
        }

        match config_action(NotebookFrontend::Lab) {
            StepAction::WriteConfigFile { path, contents } => {
                assert_eq!(path, "~/.jupyter/jupyter_server_config.py");
                assert!(contents.contains("c.ServerApp.ip"));
            }
            other => panic!("expected config write, got {other:?}"),
        }
    }

    #[test]
    fn test_extension_after_unknown_id_rejected() {
        let extensions = vec![ExtensionStep {
            id: "warm-dataset-cache".to_string(),
            program: "true".to_string(),
            args: vec![],
            after: vec!["no-such-step".to_string()],
            idempotent: false,
        }];
        let err = build_plan(&descriptor(), &table(), &extensions).unwrap_err();
        match err {
            EngineError::IncompatibleConfiguration(message) => {
                assert!(message.contains("no-such-step"));
            }
            other => panic!("expected incompatible configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_cyclic_extensions_detected() {
        let extensions = vec![
            ExtensionStep {
                id: "a".to_string(),
                program: "true".to_string(),
                args: vec![],
                after: vec!["b".to_string()],
                idempotent: false,
            },
            ExtensionStep {
                id: "b".to_string(),
                program: "true".to_string(),
                args: vec![],
                after: vec!["a".to_string()],
                idempotent: false,
            },
        ];
        let err = build_plan(&descriptor(), &table(), &extensions).unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency(_)));
    }
}
