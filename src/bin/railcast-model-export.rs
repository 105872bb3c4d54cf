//! Convert stored model artifacts into tree-ensemble interchange graphs.

use std::path::PathBuf;

use railcast::artifacts::{
    ArtifactStore, GRADIENT_BOOSTING_MODEL, RANDOM_FOREST_MODEL, RECOVERY_REGRESSOR,
    STATUS_CLASSIFIER,
};
use railcast::config::DEFAULT_ARTIFACT_DIR;
use railcast::interchange::InterchangeGraph;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = railcast::logging::init("railcast-model-export") {
        eprintln!("Logging disabled: {err}");
    }
    let store = ArtifactStore::new(&options.artifact_dir);
    let out_dir = options
        .out_dir
        .clone()
        .unwrap_or_else(|| options.artifact_dir.clone());
    let names = if options.names.is_empty() {
        default_names(&store)
    } else {
        options.names.clone()
    };
    if names.is_empty() {
        return Err(format!(
            "No model artifacts found in {}",
            options.artifact_dir.display()
        ));
    }

    for name in names {
        let graph = if name == RECOVERY_REGRESSOR {
            let model = store.load_regressor().map_err(|err| err.to_string())?;
            InterchangeGraph::from_regressor(&name, &model)
        } else {
            let model = store.load_classifier(&name).map_err(|err| err.to_string())?;
            InterchangeGraph::from_classifier(&name, &model)
        };
        graph.validate().map_err(|err| err.to_string())?;
        let path = graph.save(&out_dir).map_err(|err| err.to_string())?;
        println!(
            "{name}: {} trees, {} inputs -> {}",
            graph.ensemble.trees.len(),
            graph.n_features(),
            path.display()
        );
    }
    Ok(())
}

fn default_names(store: &ArtifactStore) -> Vec<String> {
    [
        RANDOM_FOREST_MODEL,
        GRADIENT_BOOSTING_MODEL,
        STATUS_CLASSIFIER,
        RECOVERY_REGRESSOR,
    ]
    .into_iter()
    .filter(|name| store.contains(name))
    .map(str::to_string)
    .collect()
}

#[derive(Debug)]
struct CliOptions {
    artifact_dir: PathBuf,
    out_dir: Option<PathBuf>,
    names: Vec<String>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut artifact_dir = PathBuf::from(DEFAULT_ARTIFACT_DIR);
    let mut out_dir = None;
    let mut names = Vec::new();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--artifact-dir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--artifact-dir requires a value".to_string())?;
                artifact_dir = PathBuf::from(value);
            }
            "--out-dir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out-dir requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--name" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--name requires a value".to_string())?;
                names.push(value.clone());
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions {
        artifact_dir,
        out_dir,
        names,
    })
}

fn help_text() -> String {
    [
        "railcast-model-export",
        "",
        "Writes <name>.graph.json tree-ensemble graphs for stored models.",
        "",
        "Usage:",
        "  railcast-model-export [--artifact-dir models] [--out-dir <dir>] [--name <artifact>]...",
        "",
        "Options:",
        "  --artifact-dir <dir>  Directory holding the model artifacts (default: models).",
        "  --out-dir <dir>       Where graphs are written (default: the artifact directory).",
        "  --name <artifact>     Artifact to export; repeatable (default: every model present).",
    ]
    .join("\n")
}
