//! Train the disruption classifiers (and the recovery regressor) from an observation file.

use std::path::PathBuf;

use railcast::config::{
    BoostingOverrides, ConfigOverrides, ForestOverrides, TrainingConfig, load_file_overrides,
};
use railcast::dataset::FeatureSchema;
use railcast::ml::ClassWeight;
use railcast::pipeline::run_training;
use railcast::report::render_training_report;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = railcast::logging::init("railcast-train") {
        eprintln!("Logging disabled: {err}");
    }
    let file = load_file_overrides(options.config.as_deref()).map_err(|err| err.to_string())?;
    let config =
        TrainingConfig::resolve(file.as_ref(), &options.overrides).map_err(|err| err.to_string())?;
    let (outcome, written) = run_training(&config).map_err(|err| err.to_string())?;

    print!("{}", render_training_report(&outcome.report));
    println!();
    println!("artifacts written to {}:", config.artifact_dir.display());
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    overrides: ConfigOverrides,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut forest = ForestOverrides::default();
    let mut boosting = BoostingOverrides::default();

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--no-regressor" => options.overrides.no_regressor = true,
            "--schema" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.schema = Some(value.parse::<FeatureSchema>()?);
            }
            "--data" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.dataset = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.config = Some(PathBuf::from(value));
            }
            "--artifact-dir" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.artifact_dir = Some(PathBuf::from(value));
            }
            "--delimiter" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.delimiter = Some(parse_delimiter(value)?);
            }
            "--test-fraction" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.test_fraction = Some(parse_number(flag, value)?);
            }
            "--seed" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.seed = Some(parse_number(flag, value)?);
            }
            "--thresholds" => {
                let value = flag_value(&args, &mut idx, flag)?;
                options.overrides.thresholds = Some(parse_thresholds(value)?);
            }
            "--rf-trees" => {
                let value = flag_value(&args, &mut idx, flag)?;
                forest.n_estimators = Some(parse_number(flag, value)?);
            }
            "--rf-max-depth" => {
                let value = flag_value(&args, &mut idx, flag)?;
                forest.max_depth = Some(parse_number(flag, value)?);
            }
            "--rf-class-weight" => {
                let value = flag_value(&args, &mut idx, flag)?;
                forest.class_weight = Some(value.parse::<ClassWeight>()?);
            }
            "--gb-rounds" => {
                let value = flag_value(&args, &mut idx, flag)?;
                boosting.rounds = Some(parse_number(flag, value)?);
            }
            "--gb-learning-rate" => {
                let value = flag_value(&args, &mut idx, flag)?;
                boosting.learning_rate = Some(parse_number(flag, value)?);
            }
            "--gb-max-depth" => {
                let value = flag_value(&args, &mut idx, flag)?;
                boosting.max_depth = Some(parse_number(flag, value)?);
            }
            "--gb-class-weight" => {
                let value = flag_value(&args, &mut idx, flag)?;
                boosting.class_weight = Some(value.parse::<ClassWeight>()?);
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    if forest != ForestOverrides::default() {
        options.overrides.random_forest = Some(forest);
    }
    if boosting != BoostingOverrides::default() {
        options.overrides.gradient_boosting = Some(boosting);
    }
    Ok(options)
}

fn flag_value<'a>(args: &'a [String], idx: &mut usize, flag: &str) -> Result<&'a str, String> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn parse_delimiter(value: &str) -> Result<char, String> {
    if value == "\\t" || value == "tab" {
        return Ok('\t');
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(format!("Invalid --delimiter value: {value}")),
    }
}

fn parse_thresholds(value: &str) -> Result<Vec<f32>, String> {
    value
        .split(',')
        .map(|part| parse_number::<f32>("--thresholds", part.trim()))
        .collect()
}

fn help_text() -> String {
    [
        "railcast-train",
        "",
        "Trains the random forest and gradient boosting status classifiers, plus the",
        "recovery-time regressor for the advanced schema, and writes checksummed artifacts.",
        "",
        "Usage:",
        "  railcast-train --data <file> [--schema basic|advanced] [options]",
        "",
        "Options:",
        "  --data <file>              Observation CSV (required unless set in the config file).",
        "  --schema <name>            basic or advanced (default: basic).",
        "  --config <file>            TOML config (default: railcast.toml in the app directory).",
        "  --artifact-dir <dir>       Output directory for artifacts (default: models).",
        "  --delimiter <char>         Field delimiter; use \\t for tabs (default: ,).",
        "  --test-fraction <f64>      Held-out share of rows (default: 0.2).",
        "  --seed <u64>               Seed for the split and every model (default: 42).",
        "  --thresholds <list>        Comma-separated P(disruption) thresholds (default: 0.3,0.4,0.5).",
        "  --rf-trees <n>             Random forest trees (default: 100).",
        "  --rf-max-depth <n>         Random forest depth limit (default: unlimited).",
        "  --rf-class-weight <mode>   none or balanced (default: balanced).",
        "  --gb-rounds <n>            Boosting rounds (default: 100 basic, 200 advanced).",
        "  --gb-learning-rate <f32>   Boosting learning rate (default: 0.1).",
        "  --gb-max-depth <n>         Boosting tree depth (default: 3 basic, 5 advanced).",
        "  --gb-class-weight <mode>   none or balanced (default: none).",
        "  --no-regressor             Skip the recovery-time regressor.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn flags_become_overrides() {
        let options = parse_args(args(&[
            "--schema",
            "advanced",
            "--data",
            "obs.csv",
            "--thresholds",
            "0.2, 0.6",
            "--gb-rounds",
            "12",
            "--rf-class-weight",
            "none",
            "--delimiter",
            "\\t",
            "--no-regressor",
        ]))
        .unwrap();
        let overrides = options.overrides;
        assert_eq!(overrides.schema, Some(FeatureSchema::Advanced));
        assert_eq!(overrides.thresholds, Some(vec![0.2, 0.6]));
        assert_eq!(overrides.gradient_boosting.unwrap().rounds, Some(12));
        assert_eq!(
            overrides.random_forest.unwrap().class_weight,
            Some(ClassWeight::None)
        );
        assert_eq!(overrides.delimiter, Some('\t'));
        assert!(overrides.no_regressor);
        assert!(overrides.regressor.is_none());
    }

    #[test]
    fn bad_values_and_unknown_flags_are_reported() {
        assert_eq!(
            parse_args(args(&["--seed", "x"])).unwrap_err(),
            "Invalid --seed value: x"
        );
        assert_eq!(
            parse_args(args(&["--seed"])).unwrap_err(),
            "--seed requires a value"
        );
        assert!(parse_args(args(&["--bogus"])).unwrap_err().starts_with("Unknown argument: --bogus"));
        assert!(parse_args(args(&["--schema", "full"])).is_err());
    }
}
