use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

const HEADER: [&str; 14] = [
    "Date",
    "Product_Type",
    "Department",
    "Shift",
    "Manager",
    "Factory_Unit",
    "Machine_Unit",
    "Productivity_Zone",
    "Anomaly_Conduct",
    "Labor_Presence",
    "Labor_Total_Output",
    "Labor_Target_Output",
    "Productivity",
    "Labor_Efficiency_Rate",
];

/// Department → (manager, products it builds).
const DEPARTMENTS: [(&str, &str, &[&str]); 4] = [
    ("Assembly", "Hughes", &["Gearbox", "Axle"]),
    ("Machining", "Okafor", &["Shaft", "Bracket"]),
    ("Finishing", "Lindqvist", &["Bracket", "Housing"]),
    ("Packaging", "Moreau", &["Housing", "Gearbox"]),
];

/// Shift → mean productivity offset.
const SHIFTS: [(&str, f64); 3] = [("Morning", 4.0), ("Afternoon", 0.0), ("Night", -6.0)];

const FACTORIES: [&str; 2] = ["North", "South"];
const MACHINES: [&str; 4] = ["M-01", "M-02", "M-03", "M-04"];
const CONDUCTS: [&str; 3] = ["Late Arrival", "Machine Misuse", "Early Leave"];

fn zone(productivity: f64) -> &'static str {
    if productivity >= 90.0 {
        "Green"
    } else if productivity >= 75.0 {
        "Yellow"
    } else {
        "Red"
    }
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/labor_productivity_sample.csv"));
    if let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut rng = SimpleRng::new(42);
    let mut writer = csv::Writer::from_path(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    writer.write_record(HEADER)?;

    let first_day = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;
    let mut rows = 0usize;
    for day in 0..182 {
        let date = first_day + Duration::days(day);
        if date.weekday() == Weekday::Sun {
            continue;
        }
        for (department, manager, products) in DEPARTMENTS {
            for (shift, offset) in SHIFTS {
                let product = rng.pick(products);
                let factory = rng.pick(&FACTORIES);
                let machine = rng.pick(&MACHINES);

                let presence = rng.gauss(7.5, 0.6).clamp(4.0, 9.0);
                let target = (presence * 12.0).round();
                let productivity = rng.gauss(85.0 + offset, 8.0).clamp(40.0, 110.0);
                let output = (target * productivity / 100.0).round();
                let efficiency = (productivity + rng.gauss(-3.0, 4.0)).clamp(30.0, 100.0);
                let conduct = if rng.next_f64() < 0.08 {
                    rng.pick(&CONDUCTS)
                } else {
                    ""
                };

                writer.write_record([
                    date.format("%Y-%m-%d").to_string(),
                    product.to_string(),
                    department.to_string(),
                    shift.to_string(),
                    manager.to_string(),
                    factory.to_string(),
                    machine.to_string(),
                    zone(productivity).to_string(),
                    conduct.to_string(),
                    format!("{presence:.2}"),
                    format!("{output:.0}"),
                    format!("{target:.0}"),
                    format!("{productivity:.2}"),
                    format!("{efficiency:.2}"),
                ])?;
                rows += 1;
            }
        }
    }
    writer.flush()?;

    println!("Wrote {rows} rows to {}", output_path.display());
    Ok(())
}
