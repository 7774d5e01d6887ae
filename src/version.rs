// Build-time identity, served by GET /version and printed by `sensor-ops --version`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");
