//! # Placement - Where Each Seedling Takes Root
//!
//! Assigns every program in a [`ProgramSet`] its own load address from the
//! arithmetic sequence `base + index * step`.
//!
//! ## Guarantees
//!
//! - Addresses are strictly increasing with index
//! - Any two programs are at least `step` bytes apart
//!
//! That `step` is larger than every linked program is assumed, not checked
//! here. The builder warns when an artifact outgrows its slot.

use crate::error::{BinderError, Result};
use crate::program_set::ProgramSet;

/// One program and the address it is linked at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub name: String,
    pub address: u64,
}

/// Load address of the program at `index`
pub fn address_of(base: u64, step: u64, index: usize) -> Result<u64> {
    if step == 0 {
        return Err(BinderError::ZeroStep);
    }

    u64::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(step))
        .and_then(|offset| base.checked_add(offset))
        .ok_or(BinderError::AddressOverflow { index })
}

/// Place every program in the set, in set order
///
/// Fails before returning anything if any address would overflow.
pub fn place(set: &ProgramSet, base: u64, step: u64) -> Result<Vec<Placement>> {
    if step == 0 {
        return Err(BinderError::ZeroStep);
    }

    set.iter()
        .map(|(index, name)| {
            Ok(Placement {
                index,
                name: name.to_string(),
                address: address_of(base, step, index)?,
            })
        })
        .collect()
}
