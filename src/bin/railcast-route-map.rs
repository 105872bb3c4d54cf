//! Export the fitted route encoder as a plain `route_id -> code` JSON map.

use std::path::PathBuf;

use railcast::artifacts::ArtifactStore;
use railcast::config::DEFAULT_ARTIFACT_DIR;
use railcast::route_map::{ROUTE_MAP_FILE_NAME, export_route_map};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = railcast::logging::init("railcast-route-map") {
        eprintln!("Logging disabled: {err}");
    }
    let store = ArtifactStore::new(&options.artifact_dir);
    let encoder = store.load_route_encoder().map_err(|err| err.to_string())?;
    let count = export_route_map(&encoder, &options.out).map_err(|err| err.to_string())?;
    println!("wrote {count} routes to {}", options.out.display());
    Ok(())
}

#[derive(Debug)]
struct CliOptions {
    artifact_dir: PathBuf,
    out: PathBuf,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut artifact_dir = PathBuf::from(DEFAULT_ARTIFACT_DIR);
    let mut out = PathBuf::from(ROUTE_MAP_FILE_NAME);

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
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out = PathBuf::from(value);
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions { artifact_dir, out })
}

fn help_text() -> String {
    [
        "railcast-route-map",
        "",
        "Writes the route encoder stored in an artifact directory as a JSON object",
        "mapping each route_id to its integer code.",
        "",
        "Usage:",
        "  railcast-route-map [--artifact-dir models] [--out route_map.json]",
        "",
        "Options:",
        "  --artifact-dir <dir>  Directory holding route_encoder.json (default: models).",
        "  --out <file>          Output path (default: route_map.json).",
    ]
    .join("\n")
}
