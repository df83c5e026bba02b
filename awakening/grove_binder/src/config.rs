//! # Binder Configuration
//!
//! Constants and paths that describe where user programs live, where they
//! are placed in memory, and where the generated table is written.
//!
//! Every path is kept relative to a root directory so the same
//! configuration works from any checkout.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

/// Load address of the first user program
pub const DEFAULT_BASE_ADDRESS: u64 = 0x8040_0000;

/// Distance between consecutive program load addresses (128 KiB)
///
/// Must exceed the largest linked program image.
pub const DEFAULT_STEP: u64 = 0x2_0000;

/// Directory whose entries form the program set
pub const DEFAULT_PROGRAMS_DIR: &str = "user/bin";

/// Shared linker layout used to link every user program
pub const DEFAULT_LAYOUT: &str = "user/linker.ld";

/// Directory the toolchain writes linked programs into
pub const DEFAULT_ARTIFACT_DIR: &str = "zig-out";

/// Generated assembly consumed by the kernel build
pub const DEFAULT_TABLE_OUTPUT: &str = "kernel/link_app.S";

/// Scratch directory for private layouts and the program manifest
pub const DEFAULT_OUT_DIR: &str = "target/grove_binder";

/// Debug or release build variant, passed through to the toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    Debug,
    #[default]
    Release,
}

impl BuildMode {
    pub fn is_debug(self) -> bool {
        self == BuildMode::Debug
    }
}

/// How each program is linked against its load address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutStrategy {
    /// Patch the shared layout in place for the duration of each build,
    /// restoring the original bytes afterward. Works with a `build.zig`
    /// that only knows `-DappName` and `-Ddebug`.
    #[default]
    Shared,
    /// Render a per-program copy of the layout and hand its path to the
    /// toolchain. The shared layout is never written, but the build script
    /// must accept the layout argument.
    Private,
}

impl LayoutStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(LayoutStrategy::Private),
            "shared" => Some(LayoutStrategy::Shared),
            _ => None,
        }
    }
}

/// What to do when one program fails to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing program
    #[default]
    Abort,
    /// Build every program, then report all failures together
    KeepGoing,
}

bitflags! {
    /// Pipeline stages selected on the command line
    pub struct Stages: u8 {
        /// Place and build every user program
        const APPS = 0b001;
        /// Generate the embedding table
        const TABLE = 0b010;
        /// Build the final kernel image
        const IMAGE = 0b100;
    }
}

impl Stages {
    /// Parse a stage name (`apps`, `table`, `image`, `all`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "apps" => Some(Stages::APPS),
            "table" => Some(Stages::TABLE),
            "image" => Some(Stages::IMAGE),
            "all" => Some(Stages::all()),
            _ => None,
        }
    }
}

/// Full configuration for one binder run
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Root all relative paths are resolved against
    pub root: PathBuf,
    pub base_address: u64,
    pub step: u64,
    pub programs_dir: PathBuf,
    pub layout: PathBuf,
    pub artifact_dir: PathBuf,
    pub table_output: PathBuf,
    pub out_dir: PathBuf,
    /// Optional packed image written alongside the assembly table
    pub packed_output: Option<PathBuf>,
    /// Also emit the `_app_names` string table
    pub emit_names: bool,
    pub mode: BuildMode,
    pub layout_strategy: LayoutStrategy,
    pub failure_policy: FailurePolicy,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            base_address: DEFAULT_BASE_ADDRESS,
            step: DEFAULT_STEP,
            programs_dir: PathBuf::from(DEFAULT_PROGRAMS_DIR),
            layout: PathBuf::from(DEFAULT_LAYOUT),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            table_output: PathBuf::from(DEFAULT_TABLE_OUTPUT),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            packed_output: None,
            emit_names: false,
            mode: BuildMode::Release,
            layout_strategy: LayoutStrategy::Shared,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl BinderConfig {
    /// Create a default configuration rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Resolve a configured path against the root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn programs_dir(&self) -> PathBuf {
        self.resolve(&self.programs_dir)
    }

    pub fn layout_path(&self) -> PathBuf {
        self.resolve(&self.layout)
    }

    pub fn table_path(&self) -> PathBuf {
        self.resolve(&self.table_output)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.resolve(&self.out_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir().join("programs.manifest")
    }

    /// Where the toolchain leaves the linked binary for `name`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.resolve(&self.artifact_dir).join(name)
    }

    /// Artifact path as written into the generated assembly
    ///
    /// Kept relative to the root so generated tables do not depend on
    /// where the checkout lives.
    pub fn artifact_include_path(&self, name: &str) -> String {
        let joined = self.artifact_dir.join(name);
        joined.to_string_lossy().replace('\\', "/")
    }

    /// Path of the private layout rendered for `name`
    pub fn private_layout_path(&self, name: &str) -> PathBuf {
        self.out_dir().join("layouts").join(format!("{}.ld", name))
    }

    pub fn packed_path(&self) -> Option<PathBuf> {
        self.packed_output.as_deref().map(|p| self.resolve(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = BinderConfig::default();
        assert_eq!(config.base_address, 0x80400000);
        assert_eq!(config.step, 0x20000);
        assert_eq!(config.mode, BuildMode::Release);
        assert_eq!(config.layout_strategy, LayoutStrategy::Shared);
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let config = BinderConfig::with_root("/work/os");
        assert_eq!(config.layout_path(), PathBuf::from("/work/os/user/linker.ld"));
        assert_eq!(config.artifact_path("hello"), PathBuf::from("/work/os/zig-out/hello"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("/work/os/target/grove_binder/programs.manifest")
        );
        assert_eq!(config.artifact_include_path("hello"), "zig-out/hello");
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = BinderConfig::with_root("/work/os");
        config.layout = PathBuf::from("/elsewhere/linker.ld");
        assert_eq!(config.layout_path(), PathBuf::from("/elsewhere/linker.ld"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stages::from_name("apps"), Some(Stages::APPS));
        assert_eq!(Stages::from_name("all"), Some(Stages::APPS | Stages::TABLE | Stages::IMAGE));
        assert!(Stages::from_name("kernel").is_none());
    }
}
