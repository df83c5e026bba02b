//! # Program Builder - Raising the Seedlings
//!
//! Places every program of the set and drives one toolchain build per
//! program at its address, strictly one after another.
//!
//! With [`LayoutStrategy::Shared`] the shared layout holds one program's
//! address at a time. It is restored after every build, failed or not, so
//! the next program patches from the same baseline and the file is
//! unchanged once the run ends.
//!
//! A successful run leaves one artifact per program and a manifest naming
//! them in table order.

use std::fs;
use std::io;

use log::{error, info, warn};

use crate::config::{BinderConfig, FailurePolicy, LayoutStrategy};
use crate::error::{BinderError, Result};
use crate::layout::{hex_literal, LayoutTemplate};
use crate::manifest::{digest, Digest, Manifest};
use crate::placement::{place, Placement};
use crate::program_set::ProgramSet;
use crate::toolchain::{BuildRequest, Toolchain};

/// Place and build every program in `set`
///
/// Writes the manifest only if every program built, and returns it.
pub fn build_programs(
    config: &BinderConfig,
    set: &ProgramSet,
    toolchain: &mut dyn Toolchain,
) -> Result<Manifest> {
    let placements = place(set, config.base_address, config.step)?;
    let template = LayoutTemplate::load(&config.layout_path(), config.base_address)?;

    // A manifest from an earlier run must not outlive a failed one.
    let manifest_path = config.manifest_path();
    match fs::remove_file(&manifest_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(BinderError::io("remove manifest", &manifest_path, e)),
    }

    let mut manifest = Manifest::default();
    let mut failed = Vec::new();

    for placement in &placements {
        match build_one(config, &template, placement, toolchain) {
            Ok(digest) => manifest.push(placement, digest),
            // The layout is dirty; nothing after this can be trusted.
            Err(e @ BinderError::LayoutRestore { .. }) => return Err(e),
            Err(e) => match config.failure_policy {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::KeepGoing => {
                    error!("{}", e);
                    failed.push(placement.name.clone());
                }
            },
        }
    }

    if !failed.is_empty() {
        return Err(BinderError::BuildFailed { programs: failed });
    }

    manifest.save(&manifest_path)?;
    Ok(manifest)
}

/// Build one program and return the digest of its artifact
fn build_one(
    config: &BinderConfig,
    template: &LayoutTemplate,
    placement: &Placement,
    toolchain: &mut dyn Toolchain,
) -> Result<Digest> {
    info!(
        "application {} start with address {}",
        placement.name,
        hex_literal(placement.address)
    );

    match config.layout_strategy {
        LayoutStrategy::Private => {
            let layout = config.private_layout_path(&placement.name);
            template.write_private(placement.address, &layout)?;
            toolchain.build_program(&BuildRequest {
                name: &placement.name,
                address: placement.address,
                layout: Some(&layout),
                mode: config.mode,
            })?;
        }
        LayoutStrategy::Shared => {
            let patch = template.patch_shared(placement.address)?;
            let built = toolchain.build_program(&BuildRequest {
                name: &placement.name,
                address: placement.address,
                layout: None,
                mode: config.mode,
            });
            match (built, patch.restore()) {
                (Err(build_err), Err(restore_err)) => {
                    // Only the restore failure is returned; keep the build failure visible.
                    error!("{} failed to build: {}", placement.name, build_err);
                    return Err(restore_err);
                }
                (_, Err(restore_err)) => return Err(restore_err),
                (built, Ok(())) => built?,
            }
        }
    }

    let artifact = config.artifact_path(&placement.name);
    let bytes = fs::read(&artifact).map_err(|_| BinderError::MissingArtifact {
        program: placement.name.clone(),
        path: artifact.clone(),
    })?;

    if bytes.len() as u64 > config.step {
        warn!(
            "{} is {} bytes, larger than the {:#x} byte address step",
            placement.name,
            bytes.len(),
            config.step
        );
    }

    Ok(digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildMode;
    use crate::testutil::{FakeToolchain, TempDir};

    const LAYOUT: &str = "BASE_ADDRESS = 0x80400000;\nSECTIONS { . = BASE_ADDRESS; }\n";

    fn setup(label: &str, strategy: LayoutStrategy) -> (TempDir, BinderConfig) {
        let dir = TempDir::new(label);
        dir.write("user/linker.ld", LAYOUT);
        let mut config = BinderConfig::with_root(dir.path());
        config.layout_strategy = strategy;
        (dir, config)
    }

    #[test]
    fn test_shared_layout_seen_patched_then_restored() {
        let (dir, config) = setup("builder-shared", LayoutStrategy::Shared);
        let set = ProgramSet::from_names(["hello", "echo"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config);

        let manifest = build_programs(&config, &set, &mut toolchain).unwrap();

        assert_eq!(toolchain.builds.len(), 2);
        assert_eq!(toolchain.builds[0].name, "echo");
        assert!(toolchain.builds[0].layout_text.contains("0x80400000"));
        assert_eq!(toolchain.builds[1].name, "hello");
        assert_eq!(toolchain.builds[1].address, 0x80420000);
        assert!(toolchain.builds[1].layout_text.contains("0x80420000"));
        assert!(!toolchain.builds[1].layout_text.contains("0x80400000"));

        assert_eq!(fs::read_to_string(dir.path().join("user/linker.ld")).unwrap(), LAYOUT);
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_default_strategy_patches_shared_layout() {
        let dir = TempDir::new("builder-default");
        dir.write("user/linker.ld", LAYOUT);
        let config = BinderConfig::with_root(dir.path());
        let set = ProgramSet::from_names(["echo"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config);

        build_programs(&config, &set, &mut toolchain).unwrap();

        assert!(!toolchain.builds[0].private_layout);
        assert!(!config.private_layout_path("echo").exists());
    }

    #[test]
    fn test_private_layouts_never_touch_shared_file() {
        let (dir, config) = setup("builder-private", LayoutStrategy::Private);
        let set = ProgramSet::from_names(["echo", "hello"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config);

        build_programs(&config, &set, &mut toolchain).unwrap();

        assert!(toolchain.builds[1].layout_text.contains("0x80420000"));
        assert!(toolchain.builds.iter().all(|b| b.private_layout));
        assert_eq!(fs::read_to_string(dir.path().join("user/linker.ld")).unwrap(), LAYOUT);
        assert!(config.private_layout_path("hello").exists());
    }

    #[test]
    fn test_abort_restores_layout_and_stops() {
        let (dir, mut config) = setup("builder-abort", LayoutStrategy::Shared);
        config.failure_policy = FailurePolicy::Abort;
        let set = ProgramSet::from_names(["a", "b", "c"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config).failing("b");

        let err = build_programs(&config, &set, &mut toolchain).unwrap_err();

        assert!(matches!(err, BinderError::ToolchainSpawn { ref program, .. } if program == "b"));
        assert_eq!(toolchain.builds.len(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("user/linker.ld")).unwrap(), LAYOUT);
        assert!(!config.manifest_path().exists());
    }

    #[test]
    fn test_keep_going_builds_the_rest() {
        let (dir, mut config) = setup("builder-keep-going", LayoutStrategy::Shared);
        config.failure_policy = FailurePolicy::KeepGoing;
        let set = ProgramSet::from_names(["a", "b", "c", "d"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config).failing("a").failing("c");

        let err = build_programs(&config, &set, &mut toolchain).unwrap_err();

        match err {
            BinderError::BuildFailed { programs } => assert_eq!(programs, vec!["a", "c"]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(toolchain.builds.len(), 4);
        // d still saw its own address, not one left behind by c
        assert!(toolchain.builds[3].layout_text.contains("0x80460000"));
        assert_eq!(fs::read_to_string(dir.path().join("user/linker.ld")).unwrap(), LAYOUT);
        assert!(!config.manifest_path().exists());
    }

    #[test]
    fn test_empty_set_builds_nothing() {
        let (dir, config) = setup("builder-empty", LayoutStrategy::Shared);
        let mut toolchain = FakeToolchain::new(&config);

        let manifest = build_programs(&config, &ProgramSet::default(), &mut toolchain).unwrap();

        assert!(toolchain.builds.is_empty());
        assert!(manifest.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("user/linker.ld")).unwrap(), LAYOUT);
    }

    #[test]
    fn test_missing_artifact_after_build() {
        let (_dir, config) = setup("builder-no-artifact", LayoutStrategy::Private);
        let set = ProgramSet::from_names(["ghost"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config).without_artifacts();

        let err = build_programs(&config, &set, &mut toolchain).unwrap_err();
        assert!(matches!(err, BinderError::MissingArtifact { .. }));
    }

    #[test]
    fn test_missing_layout_is_fatal_before_any_build() {
        let dir = TempDir::new("builder-no-layout");
        let config = BinderConfig::with_root(dir.path());
        let set = ProgramSet::from_names(["echo"]).unwrap();
        let mut toolchain = FakeToolchain::new(&config);

        assert!(matches!(
            build_programs(&config, &set, &mut toolchain),
            Err(BinderError::Io { .. })
        ));
        assert!(toolchain.builds.is_empty());
    }

    #[test]
    fn test_stale_manifest_removed_on_failure() {
        let (_dir, config) = setup("builder-stale", LayoutStrategy::Private);
        let set = ProgramSet::from_names(["echo"]).unwrap();

        let mut toolchain = FakeToolchain::new(&config);
        build_programs(&config, &set, &mut toolchain).unwrap();
        assert!(config.manifest_path().exists());

        let mut toolchain = FakeToolchain::new(&config).failing("echo");
        assert!(build_programs(&config, &set, &mut toolchain).is_err());
        assert!(!config.manifest_path().exists());
    }

    /// Swaps the shared layout for a directory mid-build, so it cannot be restored
    struct LayoutClobberingToolchain {
        layout: std::path::PathBuf,
        builds: usize,
        build_ok: bool,
    }

    impl Toolchain for LayoutClobberingToolchain {
        fn build_program(&mut self, request: &BuildRequest<'_>) -> Result<()> {
            self.builds += 1;
            fs::remove_file(&self.layout).unwrap();
            fs::create_dir(&self.layout).unwrap();
            if self.build_ok {
                return Ok(());
            }
            Err(BinderError::ToolchainSpawn {
                program: request.name.to_string(),
                command: "clobber".to_string(),
                source: io::Error::new(io::ErrorKind::Other, "link error"),
            })
        }

        fn build_image(&mut self, _mode: BuildMode) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_restore_failure_takes_precedence() {
        for build_ok in [false, true] {
            let (_dir, mut config) = setup("builder-restore-fails", LayoutStrategy::Shared);
            config.failure_policy = FailurePolicy::KeepGoing;
            let set = ProgramSet::from_names(["echo", "hello"]).unwrap();
            let mut toolchain = LayoutClobberingToolchain {
                layout: config.layout_path(),
                builds: 0,
                build_ok,
            };

            let err = build_programs(&config, &set, &mut toolchain).unwrap_err();

            assert!(matches!(err, BinderError::LayoutRestore { .. }), "got {}", err);
            // keep-going does not carry on past a dirty layout
            assert_eq!(toolchain.builds, 1);
            assert!(!config.manifest_path().exists());
        }
    }
}
