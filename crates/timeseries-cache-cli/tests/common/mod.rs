#![allow(dead_code)]

use std::path::Path;

use timeseries_cache_core::adapters::omni2::COLUMN_WIDTHS;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// One OMNI2 hourly line with zeros everywhere except the given cells.
pub fn omni2_row(year: i32, doy: u32, hour: u32, cells: &[(usize, &str)]) -> String {
    COLUMN_WIDTHS
        .iter()
        .enumerate()
        .map(|(i, &width)| {
            let col = i + 1;
            let text = match col {
                1 => year.to_string(),
                2 => doy.to_string(),
                3 => hour.to_string(),
                _ => cells
                    .iter()
                    .find(|(c, _)| *c == col)
                    .map_or_else(|| "0".to_string(), |(_, t)| t.to_string()),
            };
            format!("{text:>width$}")
        })
        .collect()
}

/// Write `omni2_2003.dat` into `dir`: 2003-10-29 (day 302), hours 0..24,
/// Kp = 50 + hour with a fill value at 12:00, Dst = -300 and a constant
/// GSE IMF vector.
pub fn seed_2003(dir: &Path) -> std::io::Result<()> {
    let mut lines = Vec::new();
    for hour in 0..24u32 {
        let kp = if hour == 12 {
            "99".to_string()
        } else {
            (50 + hour).to_string()
        };
        lines.push(omni2_row(
            2003,
            302,
            hour,
            &[(39, kp.as_str()), (41, "-300"), (13, "1.5"), (14, "-2.5"), (15, "3.5")],
        ));
    }
    std::fs::write(dir.join("omni2_2003.dat"), lines.join("\n") + "\n")
}
