//! Universe loading port trait.

use crate::domain::error::ScanError;
use crate::domain::universe::Universe;

pub trait UniverseSource {
    fn load(&self) -> Result<Universe, ScanError>;
}
