//! Guards the default data-source configuration against accidental changes:
//! the serialized defaults must match the checked-in golden file.

use co3d_dataset::config::DataSourceConfig;

const GOLDEN: &str = include_str!("data/data_source.json");

// Flip to true and run to regenerate the golden file contents on stdout.
const DEBUG: bool = false;

#[test]
fn default_config_matches_golden_snapshot() {
    let json = serde_json::to_string_pretty(&DataSourceConfig::default())
        .expect("default config serializes");
    if DEBUG {
        println!("{json}");
    }
    assert_eq!(
        json,
        GOLDEN.trim_end(),
        "default DataSourceConfig changed; update tests/data/data_source.json"
    );
}

#[test]
fn default_config_roundtrips() {
    let restored: DataSourceConfig =
        serde_json::from_str(GOLDEN).expect("golden snapshot deserializes");
    assert_eq!(
        serde_json::to_value(&restored).expect("serializable"),
        serde_json::to_value(DataSourceConfig::default()).expect("serializable"),
        "golden snapshot does not round-trip to the default config"
    );
}
