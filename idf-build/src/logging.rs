use env_logger::Target;
use std::fs;
use std::path::PathBuf;

/// Initialise logging at `info` (overridable with `RUST_LOG`).
///
/// Logs go to `log_file` when given and writable, otherwise to stderr.
pub fn init_with(log_file: Option<PathBuf>) {
    let target = log_file
        .and_then(|path| {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = fs::create_dir_all(parent);
            }
            match fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(Target::Pipe(Box::new(file))),
                Err(err) => {
                    eprintln!("cannot open log file {}: {}", path.display(), err);
                    None
                }
            }
        })
        .unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target)
        .try_init();
}
