use serde::Serialize;

use crate::error::{Error, Result};

/// Print any serializable value as formatted JSON to stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Parse(format!("JSON serialize: {}", e)))?;
    println!("{}", output);
    Ok(())
}
