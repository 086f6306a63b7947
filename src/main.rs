use std::process;

fn main() {
    // cli::run returns instead of exiting so the exchange temp directory
    // is removed before the process ends
    let code = lasrecon::cli::run();
    process::exit(code);
}
