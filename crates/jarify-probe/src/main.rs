use std::ffi::{CStr, CString};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "jarify-probe")]
#[command(about = "Loads each shared library and reports the ones that fail.", long_about = None)]
struct Cli {
    /// Every argument is a path, even one that starts with `-`.
    #[arg(value_name = "PATH", allow_hyphen_values = true, trailing_var_arg = true)]
    paths: Vec<PathBuf>,
}

// Load failures are reported, never turned into a failing exit status.
fn main() -> std::process::ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
    }
    std::process::ExitCode::SUCCESS
}

fn try_main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return Ok(());
        }
    };

    let stderr = std::io::stderr();
    let mut stderr = stderr.lock();
    for path in &cli.paths {
        if let Err(reason) = load(path) {
            writeln!(stderr, "error loading {}: {reason}", path.display())
                .context("write to stderr")?;
        }
    }
    Ok(())
}

/// Opens `path` with lazy binding. The library stays loaded for the rest of
/// the process.
fn load(path: &Path) -> std::result::Result<(), String> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| "path contains a NUL byte".to_string())?;
    let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
    if !handle.is_null() {
        return Ok(());
    }
    let reason = unsafe { libc::dlerror() };
    if reason.is_null() {
        return Err("unknown loader error".to_string());
    }
    Err(unsafe { CStr::from_ptr(reason) }
        .to_string_lossy()
        .into_owned())
}
