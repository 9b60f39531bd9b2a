//! Interactive CSV picker for `--source csv` without `--csv`.
//!
//! Lists `*.csv` files under the current working directory and reads a choice
//! from stdin. Kept apart from clap so argument parsing stays declarative.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Directory recursion depth for finding CSV files.
const DEFAULT_SEARCH_DEPTH: usize = 4;

/// Prompt on stdin/stdout for a CSV table to read.
pub fn prompt_for_csv_path() -> Result<PathBuf, PipelineError> {
    let files = discover_csv_files(Path::new("."));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    choose_csv_path(&files, &mut stdin.lock(), &mut stdout)
}

/// Picker loop over explicit I/O handles.
///
/// Accepts a list number or a path; `q` cancels.
pub fn choose_csv_path<R: BufRead, W: Write>(
    files: &[PathBuf],
    input: &mut R,
    out: &mut W,
) -> Result<PathBuf, PipelineError> {
    if files.is_empty() {
        return Err(PipelineError::Config(
            "No .csv files found. Pass one with `forecast run --source csv --csv <file.csv>`.".to_string(),
        ));
    }

    let io_err = |e: io::Error| PipelineError::Config(format!("Failed to use the terminal: {e}"));

    writeln!(out, "Found {} CSV file(s):", files.len()).map_err(io_err)?;
    for (idx, path) in files.iter().enumerate() {
        writeln!(out, "{:>3}) {}", idx + 1, pretty_path(path)).map_err(io_err)?;
    }

    loop {
        write!(out, "Select a file by number (1-{}) or type a path (q to quit): ", files.len()).map_err(io_err)?;
        out.flush().map_err(io_err)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            return Err(PipelineError::Config(
                "No input received. Pass a CSV path with `--csv <file.csv>`.".to_string(),
            ));
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Err(PipelineError::Config("Canceled.".to_string()));
        }

        if let Ok(choice) = line.parse::<usize>() {
            if (1..=files.len()).contains(&choice) {
                return validate_csv_path(&files[choice - 1]);
            }
            writeln!(out, "Invalid choice: {choice}. Enter a number between 1 and {}.", files.len())
                .map_err(io_err)?;
            continue;
        }

        match validate_csv_path(Path::new(line)) {
            Ok(path) => return Ok(path),
            Err(err) => writeln!(out, "{err}").map_err(io_err)?,
        }
    }
}

/// Check that `path` is an existing `.csv` file.
pub fn validate_csv_path(path: &Path) -> Result<PathBuf, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::Config(format!("CSV file not found: {}", path.display())));
    }
    if path.is_dir() {
        return Err(PipelineError::Config(format!(
            "Expected a file, got a directory: {}",
            path.display()
        )));
    }
    if !has_csv_extension(path) {
        return Err(PipelineError::Config(format!(
            "Expected a .csv file (got: {}).",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// `*.csv` files under `root`, sorted by display path.
pub fn discover_csv_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, 0, DEFAULT_SEARCH_DEPTH, &mut out);
    out.sort_by_key(|p| pretty_path(p));
    out
}

fn walk(dir: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if !should_skip_dir(&path) {
                walk(&path, depth + 1, max_depth, out);
            }
        } else if file_type.is_file() && has_csv_extension(&path) {
            out.push(path);
        }
    }
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules" | "debug")
}

fn pretty_path(path: &Path) -> String {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    stripped.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "ds,y\n").unwrap();
        fs::write(dir.path().join("a.CSV"), "ds,y\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.csv"), "ds,y\n").unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target").join("skip.csv"), "").unwrap();
        dir
    }

    #[test]
    fn discovery_finds_csv_files_and_skips_build_dirs() {
        let dir = fixture();
        let files = discover_csv_files(dir.path());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv", "nested/c.csv"]);
    }

    #[test]
    fn numbered_choice_is_returned() {
        let dir = fixture();
        let files = discover_csv_files(dir.path());
        let mut out = Vec::new();
        let chosen = choose_csv_path(&files, &mut Cursor::new("7\n2\n"), &mut out).unwrap();

        assert_eq!(chosen, files[1]);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Invalid choice: 7"));
    }

    #[test]
    fn quit_and_eof_are_config_errors() {
        let dir = fixture();
        let files = discover_csv_files(dir.path());

        let err = choose_csv_path(&files, &mut Cursor::new("q\n"), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m == "Canceled."));

        let err = choose_csv_path(&files, &mut Cursor::new(""), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn validation_rejects_non_csv_paths() {
        let dir = fixture();
        assert!(validate_csv_path(&dir.path().join("notes.txt")).is_err());
        assert!(validate_csv_path(&dir.path().join("nested")).is_err());
        assert!(validate_csv_path(&dir.path().join("missing.csv")).is_err());
        assert!(validate_csv_path(&dir.path().join("b.csv")).is_ok());
    }
}
