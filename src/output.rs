use crate::error::TableportError;
use serde::Serialize;

/// Print a value to stdout as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), TableportError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| TableportError::Io(e.into()))?;
    println!("{}", text);
    Ok(())
}

/// Print error to stderr as `error: <category>: <message>`.
pub fn print_error(err: &TableportError) {
    eprintln!("error: {}", err);
}
