use std::io::Write;

/// Installs the `env_logger` backend. `RUST_LOG` overrides `level`.
pub fn init(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .parse_default_env();
    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}
