use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use railcast::dataset::Observation;

const ROUTES: [&str; 2] = ["hakodate", "sekihoku"];
const ADVANCED_STATUSES: [&str; 3] = ["normal", "delayed", "suspended"];

pub const ADVANCED_HEADER: &str = "route_id,month,wind_speed,wind_dir,wind_gust,snowfall,snow_depth,temperature,pressure,wind_change,pressure_change,status,recovery_time";
pub const BASIC_HEADER: &str =
    "route_id,month,wind_speed,wind_gust,snowfall,snow_depth,temperature,precipitation,is_stopped";

/// Advanced-schema rows where every weather column grows with severity.
///
/// `per_class[k]` rows are emitted for status `k`, interleaved so that both
/// routes and both months appear in every class.
pub fn advanced_csv(per_class: [usize; 3]) -> String {
    let mut out = String::from(ADVANCED_HEADER);
    out.push('\n');
    let longest = per_class.iter().copied().max().unwrap_or(0);
    for i in 0..longest {
        for (class, &count) in per_class.iter().enumerate() {
            if i >= count {
                continue;
            }
            let v = advanced_values(class, i);
            let recovery = match class {
                0 => 0.0,
                1 => 1.0 + 0.25 * (i % 3) as f32,
                _ => 5.0 + (i % 4) as f32,
            };
            let cells: Vec<String> = v.iter().map(|value| value.to_string()).collect();
            let _ = writeln!(
                out,
                "{},{},{},{recovery}",
                ROUTES[i % 2],
                cells.join(","),
                ADVANCED_STATUSES[class]
            );
        }
    }
    out
}

/// Basic-schema rows; class 1 (`stopped`) has the stormy readings.
pub fn basic_csv(per_class: [usize; 2]) -> String {
    let mut out = String::from(BASIC_HEADER);
    out.push('\n');
    let longest = per_class.iter().copied().max().unwrap_or(0);
    for i in 0..longest {
        for (class, &count) in per_class.iter().enumerate() {
            if i >= count {
                continue;
            }
            let severe = class as f32;
            let jitter = (i % 3) as f32;
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{class}",
                ROUTES[i % 2],
                1 + (i / 2) % 2,
                3.0 + 20.0 * severe + jitter,
                6.0 + 30.0 * severe + jitter,
                8.0 * severe + (i % 2) as f32,
                5.0 + 50.0 * severe + jitter,
                -1.0 - 9.0 * severe,
                10.0 * severe + jitter,
            );
        }
    }
    out
}

/// Numeric advanced columns (everything after `route_id`) for `class`, variant `i`.
fn advanced_values(class: usize, i: usize) -> Vec<f32> {
    let k = class;
    let jitter = (i % 3) as f32;
    let half = (i % 2) as f32;
    vec![
        (1 + (i / 2) % 2) as f32,
        [3.0, 15.0, 28.0][k] + jitter,
        180.0 + 10.0 * (i % 4) as f32,
        [6.0, 25.0, 40.0][k] + jitter,
        [0.0, 4.0, 12.0][k] + half,
        [5.0, 30.0, 70.0][k] + (i % 5) as f32,
        [-1.0, -6.0, -12.0][k] - half,
        [1015.0, 1000.0, 985.0][k] + jitter,
        [0.0, 3.0, 8.0][k] + half,
        [0.0, -3.0, -8.0][k] - half,
    ]
}

/// A calm day, milder than every `normal` row.
pub fn calm_advanced(route: &str) -> Observation {
    observation(
        route,
        vec![1.0, 1.0, 200.0, 2.0, 0.0, 0.0, 2.0, 1020.0, 0.0, 1.0],
        0,
    )
}

/// A storm, harsher than every `suspended` row.
pub fn storm_advanced(route: &str) -> Observation {
    observation(
        route,
        vec![2.0, 35.0, 200.0, 50.0, 15.0, 90.0, -15.0, 975.0, 10.0, -10.0],
        2,
    )
}

pub fn observation(route: &str, values: Vec<f32>, class_index: usize) -> Observation {
    Observation {
        line: 0,
        route_id: route.to_string(),
        values,
        class_index,
        recovery_hours: Some(0.0),
    }
}

pub fn write_csv(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write csv");
    path
}
