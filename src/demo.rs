//! Synthetic traffic for the dashboard's demo button

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};

use crate::db::format_timestamp;

/// Build one demo event: a random `genNN.test` domain hit from the
/// 192.0.2.0/24 documentation range.
pub fn synthetic_event<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Value {
    json!({
        "domain": format!("gen{}.test", rng.gen_range(0..100)),
        "source_ip": format!("192.0.2.{}", rng.gen_range(0..255)),
        "timestamp": format_timestamp(now),
        "http": { "method": "GET", "path": "/" }
    })
}
