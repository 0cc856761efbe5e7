use std::io::Write;

use crate::check::SecurityError;

/// Initialize a file-backed logger under ~/.local/share/rasp-gate/rasp.log
/// for the `log` macros used across the crate. Best-effort: returns false
/// if the host already installed a logger or the file cannot be opened.
pub fn init_file_logging(level: log::LevelFilter) -> bool {
    let Some(dir) = data_dir() else {
        return false;
    };
    let _ = std::fs::create_dir_all(&dir);
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("rasp.log"))
    else {
        return false;
    };
    simplelog::WriteLogger::init(level, simplelog::Config::default(), file).is_ok()
}

/// Append a block decision to ~/.local/share/rasp-gate/blocked.log.
/// Best-effort: failures are silently ignored (logging must never block
/// the hook path).
pub fn log_blocked(err: &SecurityError) {
    let Some(dir) = data_dir() else {
        return;
    };
    let _ = std::fs::create_dir_all(&dir);

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("blocked.log"))
    else {
        return;
    };

    // Compact single-line description for the log
    let description = err.description().replace('\n', "; ");
    let ts = timestamp_now();

    let _ = writeln!(
        file,
        "{ts}\t{kind}\t{description}",
        kind = err.kind().as_str(),
    );
}

fn data_dir() -> Option<std::path::PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(std::path::Path::new(&home).join(".local/share/rasp-gate"))
}

/// Simple UTC timestamp without external deps.
fn timestamp_now() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    let days = secs / 86400;
    let rem = secs % 86400;
    let h = rem / 3600;
    let m = (rem % 3600) / 60;
    let s = rem % 60;
    let (year, month, day) = epoch_days_to_date(days);
    format!("{year:04}-{month:02}-{day:02}T{h:02}:{m:02}:{s:02}Z")
}

/// Convert days since Unix epoch to (year, month, day).
fn epoch_days_to_date(days: u64) -> (u64, u64, u64) {
    // Civil calendar from days algorithm (Howard Hinnant)
    let z = days + 719468;
    let era = z / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}
