//! Scan output port trait.

use crate::domain::error::ScanError;
use crate::domain::scan::ScanReport;
use crate::domain::universe::Universe;

/// Receives a finished report. Sinks borrow the report, so a failed write
/// leaves it intact for the caller.
pub trait ScanSink {
    fn name(&self) -> &'static str;

    fn write(&self, report: &ScanReport, universe: &Universe) -> Result<(), ScanError>;
}
