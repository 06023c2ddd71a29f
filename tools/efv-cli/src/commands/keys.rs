//! List the metadata key vocabulary.

use efv_common::config::AppConfig;
use efv_metadata::{ExtensionCapabilities, Rect, RequestKey, ResultKey};
use serde::Serialize;

#[derive(Debug, PartialEq, Serialize)]
struct KeyRow {
    name: &'static str,
    published: bool,
}

#[derive(Serialize)]
struct KeyListing {
    request_keys: Vec<KeyRow>,
    result_keys: Vec<KeyRow>,
}

pub fn run(config: &AppConfig, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let caps = ExtensionCapabilities::eyes_free(Rect::from_size(
        config.simulation.active_array_width,
        config.simulation.active_array_height,
    ));

    if let Some(name) = name {
        let row = lookup_request_key(&caps, name)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&row)?);
        } else {
            print_section("Request key", std::slice::from_ref(&row));
        }
        return Ok(());
    }

    let listing = KeyListing {
        request_keys: RequestKey::ALL
            .iter()
            .map(|key| KeyRow {
                name: key.name(),
                published: caps.supports_request_key(*key),
            })
            .collect(),
        result_keys: ResultKey::ALL
            .iter()
            .map(|key| KeyRow {
                name: key.name(),
                published: caps.supports_result_key(*key),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_section("Request keys", &listing.request_keys);
    println!();
    print_section("Result keys", &listing.result_keys);
    Ok(())
}

fn print_section(title: &str, rows: &[KeyRow]) {
    println!("{title}");
    println!("{}", "=".repeat(50));
    for row in rows {
        let marker = if row.published { "[OK]  " } else { "[--]  " };
        println!("{marker}{}", row.name);
    }
}

/// Resolve a dotted request key name against the published set.
fn lookup_request_key(caps: &ExtensionCapabilities, name: &str) -> anyhow::Result<KeyRow> {
    let key = RequestKey::from_name(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown request key: {name}"))?;
    Ok(KeyRow {
        name: key.name(),
        published: caps.supports_request_key(key),
    })
}
