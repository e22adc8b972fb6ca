//! The process-wide default config is global state, so everything touching
//! it lives in one test binary and runs in a single test.

use flatjson::storage::{FileSystem, MemoryFileSystem};
use flatjson::{FlatJsonConfig, FlatJsonWriter, JsonColumn, WriterOptions};
use serde_json::json;
use std::path::Path;

const SPARSITY_ENV: &str = "FLATJSON_SPARSITY_FACTOR";
const NULL_FACTOR_ENV: &str = "FLATJSON_NULL_FACTOR";

fn child_names(options: WriterOptions) -> Vec<String> {
    let fs = MemoryFileSystem::new();
    let path = Path::new("default.data");
    let mut writer = FlatJsonWriter::new(options, fs.new_writable_file(path).unwrap()).unwrap();
    writer
        .append(&JsonColumn::from_values(vec![
            json!({"a": 1, "s": 1}),
            json!({"a": 2, "s": 2}),
            json!({"a": 3, "s": 3}),
            json!({"a": 4}),
            json!({"a": 5}),
        ]))
        .unwrap();
    let meta = writer.finish().unwrap();
    meta.child_names().into_iter().map(str::to_string).collect()
}

#[test]
fn test_process_default_lifecycle() {
    // invalid environment settings are rejected, never replaced by defaults
    std::env::set_var(SPARSITY_ENV, "2.5");
    assert!(FlatJsonConfig::from_env().unwrap_err().is_invalid_argument());
    assert!(FlatJsonConfig::process_default().unwrap_err().is_invalid_argument());
    assert!(WriterOptions::flat().effective_config().unwrap_err().is_invalid_argument());

    std::env::set_var(SPARSITY_ENV, "abc");
    assert!(FlatJsonConfig::from_env().is_err());

    std::env::set_var(SPARSITY_ENV, "0.6");
    std::env::set_var(NULL_FACTOR_ENV, "0.5");
    assert_eq!(
        FlatJsonConfig::from_env().unwrap(),
        FlatJsonConfig::new(0.6, 0.5).unwrap()
    );
    std::env::remove_var(SPARSITY_ENV);
    std::env::remove_var(NULL_FACTOR_ENV);

    let installed = FlatJsonConfig::new(0.5, 0.4).unwrap();
    FlatJsonConfig::install_process_default(installed).unwrap();
    let second = FlatJsonConfig::install_process_default(FlatJsonConfig::default());
    assert!(second.unwrap_err().is_invalid_argument());

    assert_eq!(FlatJsonConfig::process_default().unwrap(), installed);
    assert_eq!(WriterOptions::flat().effective_config().unwrap(), installed);

    // a write without an explicit config picks up the installed default
    assert_eq!(child_names(WriterOptions::flat()), vec!["a", "s"]);
    let explicit = WriterOptions::flat().with_config(FlatJsonConfig::default());
    assert_eq!(child_names(explicit), vec!["a", "remain"]);
}
