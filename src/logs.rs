use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Returns the last `lines` lines of the log at `path`.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read.
pub fn tail_lines(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut all_lines = Vec::new();
    for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        all_lines.push(String::from_utf8_lossy(&line).into_owned());
    }

    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].to_vec())
}

/// Reads and displays the last `lines` lines of a relayer log file.
///
/// # Arguments
/// * `log_path` - The relayer's log file.
/// * `lines` - The number of log lines to display.
///
/// # Returns
/// * `Ok(())` if successful, or an error if the log exists but cannot be read.
pub fn show_logs(log_path: &Path, lines: usize) -> io::Result<()> {
    if !log_path.exists() {
        eprintln!("Error: relayer log file {} not found.", log_path.display());
        return Ok(());
    }

    for line in tail_lines(log_path, lines)? {
        println!("{}", line);
    }

    Ok(())
}
