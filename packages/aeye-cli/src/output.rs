use std::io::Write;

/// Write a JSON string to stdout followed by a newline.
pub fn write_output(json: &str) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(json.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

/// Serialize a value to pretty JSON and print it.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_output(&json)
}
