//! Version command implementation.

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

pub fn run() {
    println!("{NAME} {VERSION}");
    println!();
    println!("Granular access rules for tabular documents.");
    println!();
    println!("Build info:");
    println!("  Target:  {}", std::env::consts::ARCH);
    println!("  OS:      {}", std::env::consts::OS);
}
