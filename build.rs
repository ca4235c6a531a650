//! Build script for crudkit
//!
//! Embeds the build timestamp shown by the CLI banner.

fn main() {
    // Only rerun when src/ files change (not on every cargo build)
    println!("cargo:rerun-if-changed=src");

    let now = chrono::Utc::now();
    let timestamp = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();

    println!("cargo:rustc-env=CRUDKIT_BUILD_TIMESTAMP={}", timestamp);
}
