//! Test fixtures: scratch directories and a recording toolchain

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{BinderConfig, BuildMode};
use crate::error::BinderError;
use crate::toolchain::{BuildRequest, Toolchain};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Directory under the system temp dir, removed on drop
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "grove_binder-{}-{}-{}",
            label,
            std::process::id(),
            id
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `contents` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// A build the fake toolchain was asked to do
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub name: String,
    pub address: u64,
    /// Layout text as the toolchain would have read it
    pub layout_text: String,
    pub private_layout: bool,
}

/// Toolchain that records requests and writes a small artifact per program
pub struct FakeToolchain {
    shared_layout: PathBuf,
    config: BinderConfig,
    failing: Vec<String>,
    write_artifacts: bool,
    pub builds: Vec<RecordedBuild>,
    pub images: Vec<BuildMode>,
}

impl FakeToolchain {
    pub fn new(config: &BinderConfig) -> Self {
        Self {
            shared_layout: config.layout_path(),
            config: config.clone(),
            failing: Vec::new(),
            write_artifacts: true,
            builds: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    pub fn without_artifacts(mut self) -> Self {
        self.write_artifacts = false;
        self
    }

    /// Bytes written for a program linked at `address`
    pub fn artifact_bytes(name: &str, address: u64) -> Vec<u8> {
        let mut bytes = b"\x7fELF".to_vec();
        bytes.extend_from_slice(&address.to_le_bytes());
        bytes.extend(name.bytes().cycle().take(name.len() * 7));
        bytes
    }
}

impl Toolchain for FakeToolchain {
    fn build_program(&mut self, request: &BuildRequest<'_>) -> crate::Result<()> {
        let layout_path = request.layout.unwrap_or(self.shared_layout.as_path());
        self.builds.push(RecordedBuild {
            name: request.name.to_string(),
            address: request.address,
            layout_text: fs::read_to_string(layout_path).unwrap(),
            private_layout: request.layout.is_some(),
        });

        if self.failing.iter().any(|n| n == request.name) {
            return Err(BinderError::ToolchainSpawn {
                program: request.name.to_string(),
                command: format!("fake build {}", request.name),
                source: io::Error::new(io::ErrorKind::Other, "does not build"),
            });
        }

        if self.write_artifacts {
            let artifact = self.config.artifact_path(request.name);
            fs::create_dir_all(artifact.parent().unwrap()).unwrap();
            fs::write(&artifact, Self::artifact_bytes(request.name, request.address)).unwrap();
        }
        Ok(())
    }

    fn build_image(&mut self, mode: BuildMode) -> crate::Result<()> {
        self.images.push(mode);
        Ok(())
    }
}
