//! grove_binder command line
//!
//! ```text
//! grove_binder [apps|table|image|all] [debug] [options]
//! ```
//!
//! With no stage given, all stages run. `debug` selects the debug build
//! variant and is passed straight through to the toolchain.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::LevelFilter;

use grove_binder::config::{BinderConfig, BuildMode, FailurePolicy, LayoutStrategy, Stages};
use grove_binder::error::BinderError;
use grove_binder::toolchain::CommandToolchain;
use grove_binder::{logger, pipeline};

const USAGE: &str = "\
usage: grove_binder [apps|table|image|all] [debug] [options]

options:
    --root DIR                  resolve all paths against DIR (default: .)
    --base ADDR                 load address of the first program (default: 0x80400000)
    --step BYTES                distance between program addresses (default: 0x20000)
    --programs DIR              directory listing the programs (default: user/bin)
    --layout FILE               shared linker layout (default: user/linker.ld)
    --artifacts DIR             where linked programs appear (default: zig-out)
    --output FILE               generated table (default: kernel/link_app.S)
    --layout-strategy MODE      shared | private (default: shared)
    --keep-going                build remaining programs after a failure
    --packed FILE               also write a packed image
    --names                     also emit the _app_names table
    --toolchain PROGRAM         build driver (default: zig)
    -v, --verbose               show toolchain command lines
    -q, --quiet                 only show warnings and errors
    -h, --help                  show this message";

/// Parsed command line
#[derive(Debug)]
struct Cli {
    stages: Stages,
    config: BinderConfig,
    toolchain: Option<String>,
    level: LevelFilter,
    help: bool,
}

fn parse_number(flag: &str, value: &str) -> Result<u64, BinderError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse(),
    };
    parsed.map_err(|_| BinderError::InvalidArgument(format!("{} expects a number, got '{}'", flag, value)))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Cli, BinderError> {
    let mut cli = Cli {
        stages: Stages::empty(),
        config: BinderConfig::default(),
        toolchain: None,
        level: LevelFilter::Info,
        help: false,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| BinderError::InvalidArgument(format!("{} needs a value", flag)))
        };

        match arg.as_str() {
            "debug" | "--debug" => cli.config.mode = BuildMode::Debug,
            "release" | "--release" => cli.config.mode = BuildMode::Release,
            "--root" => cli.config.root = PathBuf::from(value("--root")?),
            "--base" => cli.config.base_address = parse_number("--base", &value("--base")?)?,
            "--step" => cli.config.step = parse_number("--step", &value("--step")?)?,
            "--programs" => cli.config.programs_dir = PathBuf::from(value("--programs")?),
            "--layout" => cli.config.layout = PathBuf::from(value("--layout")?),
            "--artifacts" => cli.config.artifact_dir = PathBuf::from(value("--artifacts")?),
            "--output" => cli.config.table_output = PathBuf::from(value("--output")?),
            "--layout-strategy" => {
                let mode = value("--layout-strategy")?;
                cli.config.layout_strategy = LayoutStrategy::parse(&mode).ok_or_else(|| {
                    BinderError::InvalidArgument(format!("unknown layout strategy '{}'", mode))
                })?;
            }
            "--keep-going" => cli.config.failure_policy = FailurePolicy::KeepGoing,
            "--packed" => cli.config.packed_output = Some(PathBuf::from(value("--packed")?)),
            "--names" => cli.config.emit_names = true,
            "--toolchain" => cli.toolchain = Some(value("--toolchain")?),
            "-v" | "--verbose" => cli.level = LevelFilter::Debug,
            "-q" | "--quiet" => cli.level = LevelFilter::Warn,
            "-h" | "--help" => cli.help = true,
            other => match Stages::from_name(other) {
                Some(stage) => cli.stages |= stage,
                None => {
                    return Err(BinderError::InvalidArgument(format!(
                        "unexpected argument '{}'",
                        other
                    )))
                }
            },
        }
    }

    if cli.stages.is_empty() {
        cli.stages = Stages::all();
    }
    Ok(cli)
}

fn main() -> Result<()> {
    let cli = parse_args(std::env::args().skip(1)).context("bad command line (try --help)")?;
    if cli.help {
        println!("{}", USAGE);
        return Ok(());
    }

    logger::init(cli.level).context("failed to install logger")?;

    let mut toolchain = CommandToolchain::zig(&cli.config.root);
    if let Some(program) = cli.toolchain {
        toolchain = toolchain.with_program(program);
    }

    pipeline::run(&cli.config, cli.stages, &mut toolchain)
        .with_context(|| format!("grove_binder failed in {}", cli.config.root.display()))
}
