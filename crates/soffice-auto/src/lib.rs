//! # soffice-auto
//!
//! Locate the [LibreOffice](https://www.libreoffice.org/) command-line
//! converter and use it to turn a legacy spreadsheet (`.xls`, `.xlsx`) into a
//! flat ODS document (`.fods`), a single uncompressed XML file whose cell
//! hyperlinks can be read line by line.
//!
//! ## How it works
//!
//! On first call to [`locate_soffice`]:
//!
//! 1. Uses `SOFFICE_PATH` when it points to an existing file.
//! 2. Tries the default install location for the current platform.
//! 3. Searches `PATH` for `soffice` / `libreoffice`.
//!
//! The resolved path is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_auto::convert_to_fods;
//! use std::path::Path;
//!
//! let fods = convert_to_fods(Path::new("report.xls"), Path::new("/tmp/work"))
//!     .expect("conversion failed");
//! println!("flat ODS written to {}", fods.display());
//! ```
//!
//! ## Platform defaults
//!
//! | OS      | Default executable                                   |
//! |---------|------------------------------------------------------|
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe`   |
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice` |
//! | Linux   | `/usr/bin/libreoffice`, `/usr/bin/soffice`           |

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Extension of the flat ODS files produced by [`convert_to_fods`].
pub const FODS_EXTENSION: &str = "fods";

/// Environment variable pointing at an explicit converter executable.
pub const SOFFICE_PATH_ENV: &str = "SOFFICE_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-auto operations.
#[derive(Error, Debug)]
pub enum SofficeError {
    /// No converter executable was found in any searched location.
    #[error("LibreOffice converter not found (searched: {searched:?}). Set SOFFICE_PATH to the soffice executable.")]
    NotFound { searched: Vec<PathBuf> },

    /// The converter process could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter ran but exited with a failure status.
    #[error("Conversion of '{input}' failed ({status}): {stderr}")]
    Failed {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    /// The converter reported success but the expected output is missing.
    #[error("Converter produced no output at '{path}'")]
    MissingOutput { path: PathBuf },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Absolute install locations tried before searching `PATH`.
    default_paths: &'static [&'static str],
    /// Executable names looked up on `PATH`.
    path_names: &'static [&'static str],
}

fn detect_platform() -> PlatformInfo {
    match std::env::consts::OS {
        "windows" => PlatformInfo {
            default_paths: &[
                "C:/Program Files/LibreOffice/program/soffice.exe",
                "C:/Program Files (x86)/LibreOffice/program/soffice.exe",
            ],
            path_names: &["soffice.exe", "soffice.com"],
        },
        "macos" => PlatformInfo {
            default_paths: &["/Applications/LibreOffice.app/Contents/MacOS/soffice"],
            path_names: &["soffice", "libreoffice"],
        },
        _ => PlatformInfo {
            default_paths: &["/usr/bin/libreoffice", "/usr/bin/soffice"],
            path_names: &["libreoffice", "soffice"],
        },
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the converter executable, resolving it on first call.
///
/// Safe to call from multiple threads; the search runs at most a handful of
/// times and the first successful result wins.
pub fn locate_soffice() -> Result<PathBuf, SofficeError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = resolve_from(
        std::env::var_os(SOFFICE_PATH_ENV),
        std::env::var_os("PATH"),
    )?;
    let _ = RESOLVED_PATH.set(path.clone());

    Ok(path)
}

/// Path of the `.fods` file the converter writes for `input` into `out_dir`.
///
/// The converter keeps the input's base name and swaps the extension.
pub fn fods_output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("report"));
    name.push(".");
    name.push(FODS_EXTENSION);
    out_dir.join(name)
}

/// Converts `input` to a flat ODS file inside `out_dir` using the located
/// converter. Returns the path of the produced file.
pub fn convert_to_fods(input: &Path, out_dir: &Path) -> Result<PathBuf, SofficeError> {
    let program = locate_soffice()?;
    convert_with(&program, input, out_dir)
}

/// Runs an explicit converter `program` (no location lookup).
pub fn convert_with(program: &Path, input: &Path, out_dir: &Path) -> Result<PathBuf, SofficeError> {
    let output = Command::new(program)
        .arg("--headless")
        .arg("--convert-to")
        .arg(FODS_EXTENSION)
        .arg("--outdir")
        .arg(out_dir)
        .arg(input)
        .output()
        .map_err(|source| SofficeError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(SofficeError::Failed {
            input: input.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let produced = fods_output_path(input, out_dir);
    if !produced.is_file() {
        return Err(SofficeError::MissingOutput { path: produced });
    }

    Ok(produced)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn resolve_from(
    env_override: Option<OsString>,
    search_path: Option<OsString>,
) -> Result<PathBuf, SofficeError> {
    let mut searched = Vec::new();

    // 1. Environment variable override.
    if let Some(p) = env_override.map(PathBuf::from) {
        if p.is_file() {
            return Ok(p);
        }
        searched.push(p);
    }

    let info = detect_platform();

    // 2. Platform install location.
    for candidate in info.default_paths.iter().map(PathBuf::from) {
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    // 3. PATH lookup.
    if let Some(dirs) = search_path {
        for dir in std::env::split_paths(&dirs) {
            for name in info.path_names {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        searched.extend(info.path_names.iter().map(PathBuf::from));
    }

    Err(SofficeError::NotFound { searched })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fods_path_swaps_extension() {
        let out = fods_output_path(Path::new("/data/report 2024.xls"), Path::new("/tmp/work"));
        assert_eq!(out, PathBuf::from("/tmp/work/report 2024.fods"));
    }

    #[test]
    fn fods_path_keeps_inner_dots() {
        let out = fods_output_path(Path::new("fatture.03.2024.xls"), Path::new("w"));
        assert_eq!(out, PathBuf::from("w/fatture.03.2024.fods"));
    }

    #[test]
    fn env_override_wins_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("my-soffice");
        std::fs::write(&exe, b"").unwrap();

        let found = resolve_from(Some(exe.clone().into_os_string()), None).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn path_search_finds_named_executable() {
        let dir = tempfile::tempdir().unwrap();
        let name = detect_platform().path_names[0];
        let exe = dir.path().join(name);
        std::fs::write(&exe, b"").unwrap();

        let missing = dir.path().join("nope");
        let found = resolve_from(
            Some(missing.into_os_string()),
            Some(dir.path().as_os_str().to_os_string()),
        );
        // A system-wide install may shadow the PATH entry; either is acceptable.
        assert!(found.is_ok());
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-soffice.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn convert_with_returns_produced_file() {
        let dir = tempfile::tempdir().unwrap();
        // $5 = outdir, $6 = input
        let script = write_script(
            dir.path(),
            r#"name=$(basename "$6"); echo "<office/>" > "$5/${name%.*}.fods""#,
        );
        let input = dir.path().join("march.xls");
        std::fs::write(&input, b"xls").unwrap();

        let out = convert_with(&script, &input, dir.path()).unwrap();
        assert_eq!(out, dir.path().join("march.fods"));
        assert!(out.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn convert_with_reports_failure_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo boom >&2; exit 3");
        let input = dir.path().join("march.xls");

        let err = convert_with(&script, &input, dir.path()).unwrap_err();
        match err {
            SofficeError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn convert_with_detects_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 0");
        let input = dir.path().join("march.xls");

        let err = convert_with(&script, &input, dir.path()).unwrap_err();
        assert!(matches!(err, SofficeError::MissingOutput { .. }));
    }
}
