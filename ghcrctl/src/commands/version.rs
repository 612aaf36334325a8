/// Get the version string for ghcrctl and libghcrctl
pub fn get_version_string() -> String {
    format!(
        "ghcrctl {}\nlibghcrctl {}",
        env!("CARGO_PKG_VERSION"),
        libghcrctl::version()
    )
}

/// Print version information to stdout
pub fn print_version() {
    println!("{}", get_version_string());
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
