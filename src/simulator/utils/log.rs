use log::LevelFilter;

/// Initialise `env_logger`. `RUST_LOG` wins over the default "info" filter;
/// repeated calls (tests) are ignored.
pub fn init_log() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format_timestamp(None)
    .try_init();
}

/// Quiet mode keeps warnings and errors only.
pub fn set_quiet(quiet: bool) {
  if quiet {
    log::set_max_level(LevelFilter::Warn);
  }
}
