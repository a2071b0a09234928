#![allow(
    clippy::len_zero,
    clippy::needless_lifetimes,
    clippy::enum_variant_names,
    clippy::useless_format
)]

#[macro_use]
mod macros;
mod cli;
mod format;
mod kms;
mod logger;
mod utils;
mod video;

fn main() {
    cli::main();
}
