//! Configuration and pool-table loading
//!
//! The pool table maps substrings of coinbase addresses to known pools.
//! The file is a JSON array of pool entries:
//!
//! ```json
//! [
//!   { "poolName": "Example Pool", "url": "https://pool.example", "searchStrings": ["t1Abc"] }
//! ]
//! ```
//!
//! Entry order matters: the first matching search string wins.

use crate::attribution::{PoolDefinition, PoolTable};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load a pool table from a JSON file.
pub fn load_pools(path: &Path) -> Result<PoolTable> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pools file: {:?}", path))?;
    parse_pools(&contents).with_context(|| format!("Invalid pools file: {:?}", path))
}

/// Load the pool table if a path is configured, otherwise an empty table.
pub fn load_pools_or_empty(path: Option<&Path>) -> Result<PoolTable> {
    match path {
        Some(path) => load_pools(path),
        None => Ok(PoolTable::new()),
    }
}

fn parse_pools(contents: &str) -> Result<PoolTable> {
    let definitions: Vec<PoolDefinition> =
        serde_json::from_str(contents).context("Failed to parse pool definitions")?;
    Ok(PoolTable::from_definitions(definitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_pools() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"[
                {{ "poolName": "Alpha", "url": "https://alpha.example", "searchStrings": ["t1Alpha", "t1A2"] }},
                {{ "poolName": "Beta", "url": "https://beta.example", "searchStrings": ["t1Be"] }}
            ]"#
        )
        .unwrap();
        file.flush().unwrap();

        let pools = load_pools(file.path()).unwrap();
        assert_eq!(pools.len(), 3);
        assert_eq!(pools.lookup("t1A2xyz").unwrap().pool_name, "Alpha");
        assert_eq!(pools.lookup("t1Bexyz").unwrap().url, "https://beta.example");
        assert!(pools.lookup("t1Gamma").is_none());
    }

    #[test]
    fn test_missing_search_strings_allowed() {
        let pools = parse_pools(r#"[{ "poolName": "Solo", "url": "" }]"#).unwrap();
        assert!(pools.is_empty());
    }

    #[test]
    fn test_invalid_pools_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        file.flush().unwrap();
        assert!(load_pools(file.path()).is_err());
    }

    #[test]
    fn test_no_pools_file_means_empty_table() {
        assert!(load_pools_or_empty(None).unwrap().is_empty());
        assert!(load_pools(Path::new("/nonexistent/pools.json")).is_err());
    }
}
