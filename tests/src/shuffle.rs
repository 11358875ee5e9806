use {
    casecrypt_protocol::{
        Record, Resource,
        record::{ID, OWNER},
    },
    rand::{
        Rng,
        distr::{Alphanumeric, SampleString},
        rngs::StdRng,
        seq::IndexedRandom,
    },
    serde_json::{Value, json},
};

const STATUTES: &[&str] = &["Art. 286 §1", "Art. 299 §1", "Art. 258", "Art. 270 §1"];

pub fn random_text(rng: &mut StdRng, max_len: usize) -> String {
    let len = rng.random_range(0..=max_len);
    Alphanumeric.sample_string(rng, len)
}

/// A value for a sensitive field: mostly what the field usually holds, with
/// the occasional scalar or JSON-looking string mixed in.
pub fn random_sensitive_value(rng: &mut StdRng, field: &str) -> Value {
    if rng.random_bool(0.15) {
        return match rng.random_range(0..5) {
            0 => json!(rng.random_range(-1_000_000_i64..1_000_000)),
            1 => json!(rng.random_bool(0.5)),
            2 => json!(rng.random_range(2019..=2025).to_string()),
            3 => json!("true"),
            _ => json!(format!("[{}]", rng.random_range(0..10))),
        };
    }
    match field {
        "statute" => json!(STATUTES.choose(rng).copied().unwrap_or_default()),
        "caseNumber" => json!(format!("Case {}-{:03}", rng.random_range(2019..=2025), rng.random_range(1..1000))),
        "transactionData" | "requestedData" | "customFields" => {
            let mut object = serde_json::Map::new();
            for _ in 0..rng.random_range(0..4) {
                object.insert(random_text(rng, 8), json!(rng.random_range(0..100_000)));
            }
            Value::Object(object)
        }
        "markers" => Value::Array(
            (0..rng.random_range(0..5))
                .map(|_| json!(format!("{{{{{}}}}}", random_text(rng, 6))))
                .collect(),
        ),
        _ => json!(random_text(rng, 200)),
    }
}

/// A record with a random subset of the resource's sensitive fields. Some
/// fields are null; others are missing entirely.
pub fn random_record(rng: &mut StdRng, resource: Resource, owner: Option<&str>) -> Record {
    let mut record = Record::new();
    if let Some(owner) = owner {
        record.insert(OWNER.into(), owner.into());
    }
    record.insert("title".into(), json!(random_text(rng, 20)));
    for field in resource.sensitive_fields() {
        match rng.random_range(0..10) {
            0 => {}
            1 => {
                record.insert((*field).into(), Value::Null);
            }
            _ => {
                record.insert((*field).into(), random_sensitive_value(rng, field));
            }
        }
    }
    record
}

pub fn with_id(mut record: Record, id: String) -> Record {
    record.insert(ID.into(), id.into());
    record
}

/// Changes one character of a base64 envelope so that it still decodes but
/// no longer authenticates.
pub fn corrupt_envelope(rng: &mut StdRng, envelope: &str) -> String {
    let mut chars: Vec<char> = envelope.trim_end_matches('=').chars().collect();
    let padding = envelope.len().saturating_sub(chars.len());
    // Stay clear of the final character, which may carry unused bits.
    let limit = chars.len().saturating_sub(1).max(1);
    let index = rng.random_range(0..limit);
    if let Some(c) = chars.get_mut(index) {
        *c = if *c == 'A' { 'B' } else { 'A' };
    }
    let mut output: String = chars.into_iter().collect();
    output.push_str(&"=".repeat(padding));
    output
}
