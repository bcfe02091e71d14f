//! Preview command handler
//!
//! Prints the upcoming occurrences of a recurrence rule without touching
//! any job store.

use std::io::Write;

use jiff::Timestamp;
use jiff::tz::Offset;

use crate::jobs::RecurrenceRule;
use crate::jobs::recurrence::next_n_occurrences;

/// Handler for the preview command
pub struct PreviewCommandHandler {
    rule: RecurrenceRule,
    count: usize,
    after: Timestamp,
}

impl PreviewCommandHandler {
    pub fn new(rule: RecurrenceRule, count: usize, after: Option<Timestamp>) -> Self {
        Self {
            rule,
            count,
            after: after.unwrap_or_else(Timestamp::now),
        }
    }

    /// Occurrences strictly after the start instant, in order
    pub fn occurrences(&self) -> Vec<Timestamp> {
        next_n_occurrences(&self.rule, self.count, self.after)
    }

    /// Write one line per occurrence, in the rule's UTC offset
    pub fn write_to(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let offset = Offset::from_seconds(self.rule.utc_offset_minutes * 60)?;
        let occurrences = self.occurrences();

        for (index, at) in occurrences.iter().enumerate() {
            writeln!(out, "{:>4}  {}", index + 1, at.display_with_offset(offset))?;
        }

        if occurrences.len() < self.count {
            writeln!(
                out,
                "rule ends after {} occurrence(s) from {}",
                occurrences.len(),
                self.after
            )?;
        }
        Ok(())
    }

    pub fn execute(&self) -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.write_to(&mut out)
    }
}
