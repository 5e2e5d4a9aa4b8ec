//! Concrete `Capability` implementations shipped alongside the engine core.

mod cached_file;
mod create_symlink;
mod shell_compile;

pub use cached_file::CachedFile;
pub use create_symlink::CreateSymlink;
pub use shell_compile::ShellCompile;
