//! Interrupt signalling between a channel and the platform interrupt controller.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

/// A level-triggered interrupt line into the platform interrupt controller.
pub trait IrqLine {
    fn set_level(&self, level: bool);

    fn assert(&self) {
        self.set_level(true);
    }

    fn clear(&self) {
        self.set_level(false);
    }
}

/// Per-channel interrupt latch.
///
/// The pending flag models the device's INTRQ: it stays set until the host acknowledges it by
/// reading the status register. The line only follows the latch while nIEN is clear.
pub struct AtaInterrupt {
    line: Box<dyn IrqLine>,
    pending: bool,
    masked: bool,
}

impl std::fmt::Debug for AtaInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtaInterrupt")
            .field("pending", &self.pending)
            .field("masked", &self.masked)
            .finish()
    }
}

impl AtaInterrupt {
    pub fn new(line: Box<dyn IrqLine>) -> Self {
        Self {
            line,
            pending: false,
            masked: false,
        }
    }

    /// Raises the interrupt. Asserting again before acknowledgement is a no-op.
    pub fn assert(&mut self) {
        if self.pending {
            trace!("interrupt already pending");
            return;
        }
        self.pending = true;
        if !self.masked {
            self.line.assert();
        }
    }

    /// Acknowledges the interrupt and lowers the line.
    pub fn clear(&mut self) {
        if !self.pending {
            return;
        }
        self.pending = false;
        if !self.masked {
            self.line.clear();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Applies the nIEN bit. A pending interrupt stays latched while masked and reappears on
    /// the line when unmasked.
    pub fn set_masked(&mut self, masked: bool) {
        if self.masked == masked {
            return;
        }
        self.masked = masked;
        if self.pending {
            self.line.set_level(!masked);
        }
    }
}

/// Recording [`IrqLine`] for tests and headless embedding.
///
/// Clones share the same record, so one handle can be moved into a channel while another is
/// kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct TestIrqLine {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl TestIrqLine {
    /// Current level of the line.
    pub fn level(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    /// Every level written so far, in order.
    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }

    /// Number of low-to-high transitions observed.
    pub fn assert_count(&self) -> usize {
        let levels = self.levels.borrow();
        let mut previous = false;
        let mut count = 0;
        for &level in levels.iter() {
            if level && !previous {
                count += 1;
            }
            previous = level;
        }
        count
    }

    pub fn reset(&self) {
        self.levels.borrow_mut().clear();
    }
}

impl IrqLine for TestIrqLine {
    fn set_level(&self, level: bool) {
        self.levels.borrow_mut().push(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latch() -> (AtaInterrupt, TestIrqLine) {
        let line = TestIrqLine::default();
        (AtaInterrupt::new(Box::new(line.clone())), line)
    }

    #[test]
    fn assert_is_idempotent_until_cleared() {
        let (mut irq, line) = latch();
        irq.assert();
        irq.assert();
        assert!(irq.is_pending());
        assert_eq!(line.assert_count(), 1);

        irq.clear();
        assert!(!line.level());
        irq.assert();
        assert_eq!(line.assert_count(), 2);
    }

    #[test]
    fn masked_interrupt_stays_latched() {
        let (mut irq, line) = latch();
        irq.set_masked(true);
        irq.assert();
        assert!(irq.is_pending());
        assert!(!line.level());

        irq.set_masked(false);
        assert!(line.level());
        assert_eq!(line.assert_count(), 1);
    }

    #[test]
    fn clear_without_pending_does_not_touch_line() {
        let (mut irq, line) = latch();
        irq.clear();
        assert!(line.levels().is_empty());
    }
}
