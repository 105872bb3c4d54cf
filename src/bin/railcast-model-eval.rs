//! Score stored artifacts against an observation file without retraining.

use std::path::PathBuf;

use railcast::artifacts::ArtifactStore;
use railcast::config::DEFAULT_ARTIFACT_DIR;
use railcast::dataset::{FeatureSchema, load_dataset};
use railcast::evaluation::DEFAULT_THRESHOLDS;
use railcast::pipeline::evaluate_artifacts;
use railcast::report::{render_classifier, render_regressor};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = railcast::logging::init("railcast-model-eval") {
        eprintln!("Logging disabled: {err}");
    }
    let dataset = load_dataset(&options.data, options.schema, options.delimiter)
        .map_err(|err| err.to_string())?;
    let store = ArtifactStore::new(&options.artifact_dir);
    let evaluation =
        evaluate_artifacts(&store, &dataset, &options.thresholds).map_err(|err| err.to_string())?;
    if evaluation.classifiers.is_empty() {
        return Err(format!(
            "No classifier artifacts found in {}",
            options.artifact_dir.display()
        ));
    }

    let classes = options.schema.class_name_vec();
    println!("rows: {}  schema: {}", evaluation.rows, options.schema);
    for (name, eval) in &evaluation.classifiers {
        println!();
        print!("{}", render_classifier(name, eval, &classes));
    }
    if let Some(regressor) = &evaluation.regressor {
        println!();
        print!("{}", render_regressor(regressor));
    }
    Ok(())
}

#[derive(Debug)]
struct CliOptions {
    artifact_dir: PathBuf,
    data: PathBuf,
    schema: FeatureSchema,
    delimiter: u8,
    thresholds: Vec<f32>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut artifact_dir = PathBuf::from(DEFAULT_ARTIFACT_DIR);
    let mut data: Option<PathBuf> = None;
    let mut schema = FeatureSchema::Basic;
    let mut delimiter = b',';
    let mut thresholds = DEFAULT_THRESHOLDS.to_vec();

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
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                data = Some(PathBuf::from(value));
            }
            "--schema" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--schema requires a value".to_string())?;
                schema = value.parse::<FeatureSchema>()?;
            }
            "--delimiter" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--delimiter requires a value".to_string())?;
                delimiter = match value.as_str() {
                    "\\t" | "tab" => b'\t',
                    other if other.len() == 1 && other.is_ascii() => other.as_bytes()[0],
                    _ => return Err(format!("Invalid --delimiter value: {value}")),
                };
            }
            "--thresholds" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--thresholds requires a value".to_string())?;
                thresholds = value
                    .split(',')
                    .map(|part| part.trim().parse::<f32>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| format!("Invalid --thresholds value: {value}"))?;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let data = data.ok_or_else(help_text)?;
    Ok(CliOptions {
        artifact_dir,
        data,
        schema,
        delimiter,
        thresholds,
    })
}

fn help_text() -> String {
    [
        "railcast-model-eval",
        "",
        "Evaluates every stored classifier (and the recovery regressor, if present)",
        "on all rows of an observation file.",
        "",
        "Usage:",
        "  railcast-model-eval --data <file> [--schema basic|advanced] [options]",
        "",
        "Options:",
        "  --data <file>          Observation CSV (required).",
        "  --schema <name>        basic or advanced (default: basic).",
        "  --artifact-dir <dir>   Directory holding the artifacts (default: models).",
        "  --delimiter <char>     Field delimiter; use \\t for tabs (default: ,).",
        "  --thresholds <list>    Comma-separated P(disruption) thresholds (default: 0.3,0.4,0.5).",
    ]
    .join("\n")
}
