// cli/src/bgenvctl.rs — bg_setenv / bg_printenv host tooling

pub mod config;
pub mod error;
pub mod logging;
pub mod printenv;
pub mod setenv;
pub mod slots;

pub fn print_version() {
    println!("EFI Boot Guard {}", env!("CARGO_PKG_VERSION"));
}
