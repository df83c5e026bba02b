//! # Toolchain - The Forge Outside the Grove
//!
//! The compiler and linker are an external collaborator. The binder only
//! asks them to build one named program against a layout, or to build the
//! final kernel image, and looks at the exit status.
//!
//! [`Toolchain`] is the seam; [`CommandToolchain`] drives a real build tool
//! (zig by default) through a command line template.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::config::BuildMode;
use crate::error::{BinderError, Result};
use crate::layout::hex_literal;

/// Label used in errors for the image build
pub const IMAGE_TARGET: &str = "<image>";

/// Label used in errors for the debuggable kernel build
pub const KERNEL_TARGET: &str = "<kernel>";

/// One program build request
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub name: &'a str,
    pub address: u64,
    /// Private layout for this program, if one was rendered
    ///
    /// `None` means the toolchain reads the shared layout, which currently
    /// holds `address`.
    pub layout: Option<&'a Path>,
    pub mode: BuildMode,
}

/// Something that can compile and link programs
pub trait Toolchain {
    /// Build one user program. Blocks until the build finishes.
    fn build_program(&mut self, request: &BuildRequest<'_>) -> Result<()>;

    /// Build the kernel image that embeds the generated table
    fn build_image(&mut self, mode: BuildMode) -> Result<()>;
}

/// Toolchain driven through a command line
///
/// Arguments may contain `{name}`, `{address}` and `{layout}`, substituted
/// per program.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    pub program: String,
    pub working_dir: PathBuf,
    /// Arguments for building one user program
    pub app_args: Vec<String>,
    /// Extra argument passed when a private layout was rendered
    pub layout_arg: String,
    /// Argument appended to every invocation in debug mode
    pub debug_arg: String,
    /// Arguments for building the bootable image
    pub image_args: Vec<String>,
    /// Arguments for building the debuggable kernel (debug mode only)
    pub kernel_args: Vec<String>,
}

impl CommandToolchain {
    /// zig build driver, as used by the kernel's build.zig
    pub fn zig(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "zig".to_string(),
            working_dir: working_dir.into(),
            app_args: vec!["build".into(), "app".into(), "-DappName={name}".into()],
            layout_arg: "-DlinkerScript={layout}".into(),
            debug_arg: "-Ddebug".into(),
            image_args: vec!["build".into(), "img".into()],
            kernel_args: vec!["build".into()],
        }
    }

    /// Replace the driver program, keeping the argument templates
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Full argument list for one program build
    pub fn program_args(&self, request: &BuildRequest<'_>) -> Vec<String> {
        let layout = request
            .layout
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let address = hex_literal(request.address);
        let expand = |arg: &String| {
            arg.replace("{name}", request.name)
                .replace("{address}", &address)
                .replace("{layout}", &layout)
        };

        let mut args: Vec<String> = self.app_args.iter().map(expand).collect();
        if request.layout.is_some() {
            args.push(expand(&self.layout_arg));
        }
        if request.mode.is_debug() {
            args.push(self.debug_arg.clone());
        }
        args
    }

    fn with_mode(&self, base: &[String], mode: BuildMode) -> Vec<String> {
        let mut args = base.to_vec();
        if mode.is_debug() {
            args.push(self.debug_arg.clone());
        }
        args
    }

    fn run(&self, target: &str, args: &[String]) -> Result<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("running: {}", command);

        let status = Command::new(&self.program)
            .args(args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|source| BinderError::ToolchainSpawn {
                program: target.to_string(),
                command,
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(BinderError::ToolchainFailed {
                program: target.to_string(),
                status,
            })
        }
    }
}

impl Toolchain for CommandToolchain {
    fn build_program(&mut self, request: &BuildRequest<'_>) -> Result<()> {
        let args = self.program_args(request);
        self.run(request.name, &args)
    }

    fn build_image(&mut self, mode: BuildMode) -> Result<()> {
        let args = self.with_mode(&self.image_args, mode);
        self.run(IMAGE_TARGET, &args)?;

        if mode.is_debug() {
            let args = self.with_mode(&self.kernel_args, mode);
            self.run(KERNEL_TARGET, &args)?;
        }
        Ok(())
    }
}
