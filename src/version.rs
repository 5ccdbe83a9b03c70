//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string reported by the CLI and in logs: `heimdall {version}`.
pub fn version_string() -> String {
    format!("{} {PKG_VERSION}", env!("CARGO_PKG_NAME"))
}
