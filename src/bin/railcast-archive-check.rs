//! Count Wayback Machine captures of the operation-status pages.

use railcast::archive::{CDX_ENDPOINT, DEFAULT_TARGET, check_availability};
use railcast::report::render_availability;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = railcast::logging::init("railcast-archive-check") {
        eprintln!("Logging disabled: {err}");
    }
    println!("Checking availability for: {}", options.target);
    // Query failures are reported, not fatal.
    match check_availability(&options.endpoint, &options.target) {
        Ok(summary) => print!("{}", render_availability(&options.target, &summary)),
        Err(err) => {
            tracing::warn!(error = %err, "Availability check failed");
            println!("Error querying Archive.org: {err}");
        }
    }
    Ok(())
}

#[derive(Debug)]
struct CliOptions {
    target: String,
    endpoint: String,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut target = DEFAULT_TARGET.to_string();
    let mut endpoint = CDX_ENDPOINT.to_string();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--target" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--target requires a value".to_string())?;
                target = value.clone();
            }
            "--endpoint" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--endpoint requires a value".to_string())?;
                endpoint = value.clone();
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions { target, endpoint })
}

fn help_text() -> String {
    [
        "railcast-archive-check",
        "",
        "Queries the Wayback Machine CDX index once and summarises captures by year,",
        "by area page, and over the winter season (Nov-Mar).",
        "",
        "Usage:",
        "  railcast-archive-check [--target <url pattern>] [--endpoint <cdx url>]",
        "",
        "Options:",
        "  --target <pattern>  URL pattern to look up (default: the JR Hokkaido status pages).",
        "  --endpoint <url>    CDX search endpoint (default: http://web.archive.org/cdx/search/cdx).",
    ]
    .join("\n")
}
