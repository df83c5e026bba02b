//! # Layout Template - The Map Every Program Is Drawn On
//!
//! The linker layout names the address a user program is linked at as a
//! plain hex literal (`0x80400000`). To link a program elsewhere the
//! literal is swapped for the program's own address.
//!
//! Two ways of handing the result to the toolchain:
//!
//! - [`LayoutTemplate::write_private`] renders a copy of the layout for a
//!   single program. The shared file is never touched.
//! - [`LayoutTemplate::patch_shared`] rewrites the shared file and returns a
//!   [`SharedPatch`] guard. The original bytes are put back when the guard
//!   is restored or dropped, whether or not the build succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::error::{BinderError, Result};

/// Linker layout loaded from disk, with its original bytes kept for restore
#[derive(Debug, Clone)]
pub struct LayoutTemplate {
    path: PathBuf,
    /// Exact bytes read from disk
    original: Vec<u8>,
    /// Same content as text, for substitution
    text: String,
    /// Literal being replaced, e.g. `0x80400000`
    placeholder: String,
}

/// Hex literal for an address, in the form layouts spell it
pub fn hex_literal(address: u64) -> String {
    format!("{:#x}", address)
}

impl LayoutTemplate {
    /// Read the layout and make sure it mentions `base_address`
    pub fn load(path: &Path, base_address: u64) -> Result<Self> {
        let original = fs::read(path).map_err(|e| BinderError::io("read layout", path, e))?;
        let text = String::from_utf8(original.clone()).map_err(|e| {
            BinderError::io(
                "read layout",
                path,
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        let placeholder = hex_literal(base_address);
        if !text.contains(&placeholder) {
            return Err(BinderError::PlaceholderNotFound {
                path: path.to_path_buf(),
                placeholder,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            original,
            text,
            placeholder,
        })
    }

    /// Original bytes as read from disk
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Layout text with the base address replaced by `address`
    pub fn render(&self, address: u64) -> String {
        self.text.replace(&self.placeholder, &hex_literal(address))
    }

    /// Write a private copy of the layout for one program
    pub fn write_private(&self, address: u64, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BinderError::io("create directory", parent, e))?;
        }
        fs::write(dest, self.render(address))
            .map_err(|e| BinderError::io("write layout", dest, e))?;
        debug!("private layout {} -> {}", dest.display(), hex_literal(address));
        Ok(())
    }

    /// Rewrite the shared layout in place for one build
    ///
    /// If the write itself fails the original is put back before the error
    /// is returned.
    pub fn patch_shared(&self, address: u64) -> Result<SharedPatch<'_>> {
        if let Err(e) = fs::write(&self.path, self.render(address)) {
            // A failed write may have truncated the file.
            let _ = fs::write(&self.path, &self.original);
            return Err(BinderError::io("write layout", &self.path, e));
        }

        debug!("patched {} -> {}", self.path.display(), hex_literal(address));
        Ok(SharedPatch {
            template: self,
            restored: false,
        })
    }

    fn restore_original(&self) -> io::Result<()> {
        fs::write(&self.path, &self.original)
    }
}

/// Scope during which the shared layout holds one program's address
///
/// Dropping the guard restores the original bytes. Call
/// [`SharedPatch::restore`] to observe restore failures.
#[must_use = "the shared layout is restored when this guard is dropped"]
pub struct SharedPatch<'a> {
    template: &'a LayoutTemplate,
    restored: bool,
}

impl SharedPatch<'_> {
    /// Put the original layout back and report whether that worked
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.template
            .restore_original()
            .map_err(|source| BinderError::LayoutRestore {
                path: self.template.path.clone(),
                source,
            })
    }
}

impl Drop for SharedPatch<'_> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.template.restore_original() {
            error!(
                "could not restore layout {}: {}",
                self.template.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TempDir;

    const LAYOUT: &str = "OUTPUT_ARCH(riscv)\nENTRY(_start)\n\nBASE_ADDRESS = 0x80400000;\n\nSECTIONS\n{\n    . = BASE_ADDRESS;\n}\n";

    #[test]
    fn test_hex_literal_format() {
        assert_eq!(hex_literal(0x80400000), "0x80400000");
        assert_eq!(hex_literal(0x80420000), "0x80420000");
        assert_eq!(hex_literal(0xABC), "0xabc");
    }

    #[test]
    fn test_render_substitutes_address() {
        let dir = TempDir::new("layout-render");
        let path = dir.write("linker.ld", LAYOUT);
        let template = LayoutTemplate::load(&path, 0x80400000).unwrap();

        let rendered = template.render(0x80420000);
        assert!(rendered.contains("BASE_ADDRESS = 0x80420000;"));
        assert!(!rendered.contains("0x80400000"));

        // Rendering for the base address gives the original back
        assert_eq!(template.render(0x80400000), LAYOUT);
    }

    #[test]
    fn test_missing_placeholder_is_config_error() {
        let dir = TempDir::new("layout-placeholder");
        let path = dir.write("linker.ld", "BASE_ADDRESS = 0x1000;\n");

        let err = LayoutTemplate::load(&path, 0x80400000).unwrap_err();
        assert!(matches!(err, BinderError::PlaceholderNotFound { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "BASE_ADDRESS = 0x1000;\n");
    }

    #[test]
    fn test_missing_layout_is_io_error() {
        let dir = TempDir::new("layout-missing");
        let err = LayoutTemplate::load(&dir.path().join("nope.ld"), 0x80400000).unwrap_err();
        assert!(matches!(err, BinderError::Io { .. }));
    }

    #[test]
    fn test_private_copy_leaves_shared_layout_alone() {
        let dir = TempDir::new("layout-private");
        let path = dir.write("linker.ld", LAYOUT);
        let template = LayoutTemplate::load(&path, 0x80400000).unwrap();

        let dest = dir.path().join("layouts/hello.ld");
        template.write_private(0x80420000, &dest).unwrap();

        assert!(fs::read_to_string(&dest).unwrap().contains("0x80420000"));
        assert_eq!(fs::read_to_string(&path).unwrap(), LAYOUT);
    }

    #[test]
    fn test_shared_patch_restores_on_drop() {
        let dir = TempDir::new("layout-drop");
        let path = dir.write("linker.ld", LAYOUT);
        let template = LayoutTemplate::load(&path, 0x80400000).unwrap();

        {
            let _patch = template.patch_shared(0x80440000).unwrap();
            assert!(fs::read_to_string(&path).unwrap().contains("0x80440000"));
        }

        assert_eq!(fs::read(&path).unwrap(), LAYOUT.as_bytes());
    }

    #[test]
    fn test_shared_patch_explicit_restore() {
        let dir = TempDir::new("layout-restore");
        let path = dir.write("linker.ld", LAYOUT);
        let template = LayoutTemplate::load(&path, 0x80400000).unwrap();

        let patch = template.patch_shared(0x80420000).unwrap();
        patch.restore().unwrap();

        assert_eq!(fs::read(&path).unwrap(), template.original());
    }
}
