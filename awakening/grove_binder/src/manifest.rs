//! # Program Manifest - The Ledger Between Stages
//!
//! Written by the apps stage once every program has built, read by the
//! table stage. It fixes the program order once, so the table never
//! depends on a second directory listing agreeing with the first.
//!
//! ## Format
//!
//! ```text
//! # grove_binder manifest v2
//! 0 0x80400000 <sha256 hex> echo
//! 1 0x80420000 <sha256 hex> hello
//! ```
//!
//! The name is the rest of the line after the third space, so program
//! names may contain spaces.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{BinderError, Result};
use crate::placement::Placement;
use crate::program_set::ProgramSet;

/// First line of every manifest
pub const MANIFEST_HEADER: &str = "# grove_binder manifest v2";

/// SHA-256 of an artifact
pub type Digest = [u8; 32];

/// Digest of a built artifact
pub fn digest(bytes: &[u8]) -> Digest {
    hmac_sha256::Hash::hash(bytes)
}

fn to_hex(digest: &Digest) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(s: &str) -> Option<Digest> {
    if s.len() != 64 || !s.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

/// One built program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub index: usize,
    pub name: String,
    pub address: u64,
    pub digest: Digest,
}

/// Ordered record of every built program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Record a placement together with its artifact digest
    pub fn push(&mut self, placement: &Placement, digest: Digest) {
        self.entries.push(ManifestEntry {
            index: placement.index,
            name: placement.name.clone(),
            address: placement.address,
            digest,
        });
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Program set in manifest order
    pub fn program_set(&self) -> Result<ProgramSet> {
        let set = ProgramSet::from_names(self.entries.iter().map(|e| e.name.clone()))?;
        let in_order = set
            .names()
            .iter()
            .zip(&self.entries)
            .all(|(name, entry)| *name == entry.name);
        if !in_order {
            return Err(BinderError::ManifestMismatch(
                "programs are not in sorted order".to_string(),
            ));
        }
        Ok(set)
    }

    /// Serialize to the text format
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(MANIFEST_HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!(
                "{} {:#x} {} {}\n",
                entry.index,
                entry.address,
                to_hex(&entry.digest),
                entry.name
            ));
        }
        out
    }

    /// Parse the text format
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate();

        match lines.next() {
            Some((_, MANIFEST_HEADER)) => {}
            _ => {
                return Err(BinderError::Manifest {
                    line: 1,
                    reason: format!("expected '{}'", MANIFEST_HEADER),
                })
            }
        }

        let mut entries = Vec::new();
        for (n, line) in lines {
            let line_no = n + 1;
            if line.trim().is_empty() {
                continue;
            }
            let bad = |reason: &str| BinderError::Manifest {
                line: line_no,
                reason: reason.to_string(),
            };

            let fields: Vec<&str> = line.splitn(4, ' ').collect();
            let [index, address, digest, name] = fields[..] else {
                return Err(bad("expected 4 fields"));
            };
            if name.is_empty() {
                return Err(bad("empty name"));
            }

            let index: usize = index.parse().map_err(|_| bad("bad index"))?;
            if index != entries.len() {
                return Err(bad("index out of sequence"));
            }
            let address = address
                .strip_prefix("0x")
                .and_then(|hex| u64::from_str_radix(hex, 16).ok())
                .ok_or_else(|| bad("bad address"))?;
            let digest = from_hex(digest).ok_or_else(|| bad("bad digest"))?;

            entries.push(ManifestEntry {
                index,
                name: name.to_string(),
                address,
                digest,
            });
        }

        Ok(Self { entries })
    }

    /// Load a manifest, or `None` if there is none yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BinderError::io("read manifest", path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BinderError::io("create directory", parent, e))?;
        }
        fs::write(path, self.render()).map_err(|e| BinderError::io("write manifest", path, e))
    }
}
