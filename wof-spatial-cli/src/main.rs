//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = wof_spatial_cli::run() {
        eprintln!("wof-spatial: {err}");
        std::process::exit(1);
    }
}
