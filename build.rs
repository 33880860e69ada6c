//! Linker setup for the firmware image.
//!
//! Only the `firmware` build links for the MCU; host builds of the library
//! (and its tests) get no extra arguments.

fn main() {
    println!("cargo::rerun-if-env-changed=CLARGMOD_ARGS");

    if std::env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    println!("cargo::rustc-link-arg-bins=--nmagic");
    println!("cargo::rustc-link-arg-bins=-Tlink.x");
    println!("cargo::rustc-link-arg-bins=-Tdefmt.x");
}
