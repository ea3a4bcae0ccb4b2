//! Generated demo dataset

use chrono::{Duration, TimeZone, Utc};
use fp_data::{Record, Value};

const REGIONS: [&str; 5] = ["North", "South", "East", "West", "Central"];
const CHANNELS: [&str; 4] = ["web", "store", "phone", "partner"];

/// Orders placed over 2024, with a few holes in the data
pub fn orders(count: usize) -> Vec<Record> {
    let mut rng = 42u32;
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();

    (0..count)
        .map(|i| {
            let placed = start + Duration::hours((random_float(&mut rng) * 24.0 * 365.0) as i64);
            let region = REGIONS[(random_int(&mut rng) as usize) % REGIONS.len()];
            let quantity = 1 + random_int(&mut rng) % 12;
            let price = 5.0 + random_float(&mut rng) * 95.0;
            let discount = if random_float(&mut rng) < 0.1 {
                Value::Null
            } else {
                Value::from((random_float(&mut rng) * 30.0).round())
            };
            // a second channel for roughly a third of the orders
            let first = CHANNELS[i % CHANNELS.len()];
            let channels = if random_float(&mut rng) < 0.33 {
                format!("{first};{}", CHANNELS[(i + 1) % CHANNELS.len()])
            } else {
                first.to_string()
            };

            Record::new()
                .with("placed", placed)
                .with("region", region)
                .with("channels", channels)
                .with("quantity", quantity as i64)
                .with("price", (price * 100.0).round() / 100.0)
                .with("revenue", ((quantity as f64 * price) * 100.0).round() / 100.0)
                .with("discount", discount)
        })
        .collect()
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}
