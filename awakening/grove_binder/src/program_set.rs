//! # Program Set - The Roll of Seedlings
//!
//! The ordered list of user programs that will be bound into the kernel.
//!
//! Every entry in the programs directory is one program, named by its file
//! name up to the first `.`. Names are sorted byte-wise, and that order is
//! the only thing that decides a program's index: its load address and its
//! slot in the embedding table both come from it.

use std::fs;
use std::path::Path;

use crate::error::{BinderError, Result};

/// Ordered, duplicate-free list of program identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramSet {
    names: Vec<String>,
}

impl ProgramSet {
    /// Build a program set from arbitrary names
    ///
    /// Names are sorted; a repeated name is an error. Names must be
    /// non-empty and free of control characters, since they end up on
    /// manifest lines and in assembler string literals.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(bad) = names
            .iter()
            .find(|name| name.is_empty() || name.chars().any(char::is_control))
        {
            return Err(BinderError::InvalidArgument(format!(
                "unusable program name {:?}",
                bad
            )));
        }
        names.sort();

        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(BinderError::DuplicateProgram {
                name: pair[0].clone(),
            });
        }

        Ok(Self { names })
    }

    /// Enumerate the programs directory
    pub fn scan(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| BinderError::io("list", dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BinderError::io("list", dir, e))?;
            let file_name = entry.file_name().into_string().map_err(|raw| {
                BinderError::InvalidArgument(format!(
                    "file name {:?} in {} is not valid UTF-8",
                    raw,
                    dir.display()
                ))
            })?;
            if let Some(name) = program_name(&file_name) {
                names.push(name.to_string());
            }
        }

        Self::from_names(names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate `(index, name)` in table order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }
}

/// Program identifier for a directory entry
///
/// Everything from the first `.` is dropped. Hidden files yield `None`.
pub fn program_name(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }

    let name = match file_name.find('.') {
        Some(pos) => &file_name[..pos],
        None => file_name,
    };

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
