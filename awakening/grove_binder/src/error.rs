//! Binder error types

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors that can occur while placing, building, or binding programs
#[derive(Debug)]
pub enum BinderError {
    /// Filesystem access failed
    Io {
        /// What was being done when the error occurred
        action: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        source: io::Error,
    },

    /// The layout does not contain the base address literal to patch
    PlaceholderNotFound {
        path: PathBuf,
        placeholder: String,
    },

    /// Address step of zero would place every program at the same address
    ZeroStep,

    /// `base + index * step` does not fit in 64 bits
    AddressOverflow { index: usize },

    /// Two directory entries map to the same program identifier
    DuplicateProgram { name: String },

    /// Command line or configuration value could not be understood
    InvalidArgument(String),

    /// The toolchain process could not be started
    ToolchainSpawn {
        program: String,
        command: String,
        source: io::Error,
    },

    /// The toolchain ran but reported failure
    ToolchainFailed {
        program: String,
        status: ExitStatus,
    },

    /// One or more programs failed to build (keep-going mode)
    BuildFailed { programs: Vec<String> },

    /// Restoring the shared layout to its original bytes failed
    LayoutRestore { path: PathBuf, source: io::Error },

    /// A program in the set has no built artifact
    MissingArtifact { program: String, path: PathBuf },

    /// A built artifact no longer matches the digest recorded at build time
    ArtifactChanged { program: String, path: PathBuf },

    /// The manifest does not describe the current program set
    ManifestMismatch(String),

    /// The manifest file could not be parsed
    Manifest { line: usize, reason: String },
}

impl fmt::Display for BinderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinderError::Io { action, path, source } => {
                write!(f, "failed to {} {}: {}", action, path.display(), source)
            }
            BinderError::PlaceholderNotFound { path, placeholder } => write!(
                f,
                "layout {} does not contain base address {}",
                path.display(),
                placeholder
            ),
            BinderError::ZeroStep => write!(f, "address step must be non-zero"),
            BinderError::AddressOverflow { index } => {
                write!(f, "load address for program #{} overflows", index)
            }
            BinderError::DuplicateProgram { name } => {
                write!(f, "more than one program is named '{}'", name)
            }
            BinderError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            BinderError::ToolchainSpawn { program, command, source } => write!(
                f,
                "could not run toolchain for {} ({}): {}",
                program, command, source
            ),
            BinderError::ToolchainFailed { program, status } => {
                write!(f, "toolchain failed for {} ({})", program, status)
            }
            BinderError::BuildFailed { programs } => {
                write!(f, "failed to build: {}", programs.join(", "))
            }
            BinderError::LayoutRestore { path, source } => write!(
                f,
                "could not restore layout {}: {}",
                path.display(),
                source
            ),
            BinderError::MissingArtifact { program, path } => write!(
                f,
                "no built artifact for {} at {}",
                program,
                path.display()
            ),
            BinderError::ArtifactChanged { program, path } => write!(
                f,
                "artifact for {} at {} changed since it was built",
                program,
                path.display()
            ),
            BinderError::ManifestMismatch(msg) => write!(f, "manifest mismatch: {}", msg),
            BinderError::Manifest { line, reason } => {
                write!(f, "manifest line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for BinderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BinderError::Io { source, .. }
            | BinderError::ToolchainSpawn { source, .. }
            | BinderError::LayoutRestore { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl BinderError {
    /// Wrap an I/O error with the action and path it came from
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        BinderError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the binder
pub type Result<T> = core::result::Result<T, BinderError>;
