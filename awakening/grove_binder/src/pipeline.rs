//! # Pipeline - From Seed to Heartwood
//!
//! Runs the binder stages in order: apps, then table, then image. A later
//! stage only ever consumes what an earlier, completed stage left on disk.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::builder::build_programs;
use crate::config::{BinderConfig, Stages};
use crate::embed::EmbeddingTable;
use crate::error::{BinderError, Result};
use crate::manifest::{digest, Manifest};
use crate::layout::hex_literal;
use crate::packed::pack;
use crate::placement::address_of;
use crate::program_set::ProgramSet;
use crate::toolchain::Toolchain;

/// Apps stage: place and build every program in the programs directory
pub fn run_apps(config: &BinderConfig, toolchain: &mut dyn Toolchain) -> Result<Manifest> {
    let set = ProgramSet::scan(&config.programs_dir())?;
    info!("building {} application(s)", set.len());
    build_programs(config, &set, toolchain)
}

/// Program set for the table stage, checked against the built artifacts
///
/// Uses the manifest when there is one. Without it the programs directory
/// is listed again and only artifact existence can be checked.
pub fn table_program_set(config: &BinderConfig) -> Result<ProgramSet> {
    match Manifest::load(&config.manifest_path())? {
        Some(manifest) => {
            let set = manifest.program_set()?;
            warn_if_listing_changed(config, &set);
            for entry in manifest.entries() {
                let expected = address_of(config.base_address, config.step, entry.index)?;
                if entry.address != expected {
                    return Err(BinderError::ManifestMismatch(format!(
                        "{} was linked at {} but belongs at {}; run the apps stage again",
                        entry.name,
                        hex_literal(entry.address),
                        hex_literal(expected)
                    )));
                }
                let path = config.artifact_path(&entry.name);
                let bytes = read_artifact(&entry.name, &path)?;
                if digest(&bytes) != entry.digest {
                    return Err(BinderError::ArtifactChanged {
                        program: entry.name.clone(),
                        path,
                    });
                }
            }
            Ok(set)
        }
        None => {
            warn!(
                "no manifest at {}, listing {} again",
                config.manifest_path().display(),
                config.programs_dir().display()
            );
            let set = ProgramSet::scan(&config.programs_dir())?;
            for (_, name) in set.iter() {
                let path = config.artifact_path(name);
                if !path.is_file() {
                    return Err(BinderError::MissingArtifact {
                        program: name.to_string(),
                        path,
                    });
                }
            }
            Ok(set)
        }
    }
}

/// Programs only in `listed`, then programs only in `built`
pub fn listing_changes(built: &ProgramSet, listed: &ProgramSet) -> (Vec<String>, Vec<String>) {
    let only_in = |a: &ProgramSet, b: &ProgramSet| {
        a.names()
            .iter()
            .filter(|name| !b.names().contains(*name))
            .cloned()
            .collect::<Vec<_>>()
    };
    (only_in(listed, built), only_in(built, listed))
}

fn warn_if_listing_changed(config: &BinderConfig, built: &ProgramSet) {
    let dir = config.programs_dir();
    let listed = match ProgramSet::scan(&dir) {
        Ok(listed) => listed,
        Err(e) => {
            debug!("not comparing manifest with {}: {}", dir.display(), e);
            return;
        }
    };

    let (added, removed) = listing_changes(built, &listed);
    if !added.is_empty() {
        warn!(
            "not built since the last apps stage, left out of the table: {}",
            added.join(", ")
        );
    }
    if !removed.is_empty() {
        warn!(
            "no longer in {}, still in the table: {}",
            dir.display(),
            removed.join(", ")
        );
    }
}

fn read_artifact(name: &str, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|_| BinderError::MissingArtifact {
        program: name.to_string(),
        path: path.to_path_buf(),
    })
}

fn write_output(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BinderError::io("create directory", parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BinderError::io("write", path, e))
}

/// Table stage: write the embedding table (and the packed image, if asked)
pub fn run_table(config: &BinderConfig) -> Result<EmbeddingTable> {
    let set = table_program_set(config)?;
    let table = EmbeddingTable::new(&set, config);

    let table_path = config.table_path();
    write_output(&table_path, table.to_assembly(config.emit_names).as_bytes())?;
    info!(
        "wrote {} with {} application(s)",
        table_path.display(),
        table.count()
    );

    if let Some(packed_path) = config.packed_path() {
        let programs = set
            .iter()
            .map(|(_, name)| read_artifact(name, &config.artifact_path(name)))
            .collect::<Result<Vec<_>>>()?;
        write_output(&packed_path, &pack(&programs))?;
        info!("wrote packed image {}", packed_path.display());
    }

    Ok(table)
}

/// Image stage: have the toolchain build the kernel image
pub fn run_image(config: &BinderConfig, toolchain: &mut dyn Toolchain) -> Result<()> {
    info!("building kernel image");
    toolchain.build_image(config.mode)
}

/// Run the selected stages in order
pub fn run(config: &BinderConfig, stages: Stages, toolchain: &mut dyn Toolchain) -> Result<()> {
    if stages.contains(Stages::APPS) {
        run_apps(config, toolchain)?;
    }
    if stages.contains(Stages::TABLE) {
        run_table(config)?;
    }
    if stages.contains(Stages::IMAGE) {
        run_image(config, toolchain)?;
    }
    info!("done");
    Ok(())
}
