//! Built-in providers
//!
//! - `fs::File` - a file with literal content
//! - `fs::Folder` - a directory
//! - `random::Secret` - a generated secret value

mod file;
mod folder;
mod secret;

pub use file::File;
pub use folder::Folder;
pub use secret::RandomSecret;

use declarative::Registry;

/// Register every built-in provider
pub fn register_builtin(registry: &Registry) -> declarative::Result<()> {
    registry.register(File)?;
    registry.register(Folder)?;
    registry.register(RandomSecret)?;
    Ok(())
}
