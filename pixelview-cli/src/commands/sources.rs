//! List the tile sources the CLI can build.

use pixelview::source::TileSourceRegistry;

use crate::error::CliError;

/// Print registered tile source names.
pub fn run() -> Result<(), CliError> {
    let registry = TileSourceRegistry::with_builtin();

    println!("Tile sources");
    println!("============");
    for name in registry.names() {
        println!("  {}", name);
    }
    println!();
    println!("Pass parameters with --param name=value, e.g.:");
    println!("  pixelview demo --source pattern --param latency_ms=20 --param mode=probability");
    Ok(())
}
