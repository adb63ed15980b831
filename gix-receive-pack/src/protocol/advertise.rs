use std::io::{self, Write as _};

use super::{HiddenRefPredicate, RefRecord};
use crate::protocol::capabilities::{CapabilityOrdering, CapabilitySet};
use gix_packetline_blocking as pkt;

/// Writes v0/v1-style advertisements for receive-pack (blocking).
///
/// Format (first line):
///   <oid> <refname>\0<capabilities space-separated>
/// Subsequent lines:
///   <oid> <refname>
/// Finalize with a FLUSH pkt-line.
///
/// Notes
/// - For empty repositories, a special first line is emitted using a zero OID and the refname `capabilities^{}`.
/// - Capability ordering is controllable; strict-compat details will be added in later milestones.
pub struct Advertiser<W: io::Write> {
    out: pkt::Writer<W>,
    ordering: CapabilityOrdering,
}

impl<W: io::Write> Advertiser<W> {
    /// Create a new advertiser over the given writer, in text mode.
    pub fn new(write: W) -> Self {
        let mut out = pkt::Writer::new(write);
        out.enable_text_mode(); // ensure newline-terminated text pkt-lines
        Self {
            out,
            ordering: CapabilityOrdering::PreserveIdiomatic,
        }
    }

    /// Set the capability ordering policy.
    pub fn with_ordering(mut self, ordering: CapabilityOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Write the advertisement for the provided refs and capabilities, applying an optional hidden predicate.
    ///
    /// Returns Ok on success. IO errors are surfaced as `crate::Error::Io`.
    pub fn write_advertisement(
        &mut self,
        refs: &[RefRecord],
        caps: &CapabilitySet,
        hidden: Option<&HiddenRefPredicate>,
    ) -> Result<(), crate::Error> {
        let mut visible: Vec<&RefRecord> = match hidden {
            Some(pred) => refs.iter().filter(|r| !(pred)(r)).collect(),
            None => refs.iter().collect(),
        };

        let caps_line = caps.encode(self.ordering);

        if visible.is_empty() {
            // Empty repository: emit a special capabilities line with a zero OID and 'capabilities^{}'
            let zeros = "0".repeat(40); // SHA-1 default; object-format enforcement is added in M2.
            let first = format!("{zeros} capabilities^{{}}\0{caps_line}");
            self.out.write_all(first.as_bytes())?;
            pkt::encode::flush_to_write(self.out.inner_mut())?;
            self.out.flush()?;
            return Ok(());
        }

        // First visible ref line carries capabilities after a NUL
        let first_ref = visible.remove(0);
        let first = format!("{} {}\0{caps_line}", first_ref.oid.to_string(), first_ref.name);
        self.out.write_all(first.as_bytes())?;

        // Remaining refs as standard lines
        for r in visible {
            let line = format!("{} {}", r.oid.to_string(), r.name);
            self.out.write_all(line.as_bytes())?;
        }

        // Final flush
        pkt::encode::flush_to_write(self.out.inner_mut())?;
        self.out.flush()?;
        Ok(())
    }
}
