//! Log-only strip. Stands in for the hardware on machines without one.

use super::{Error, Strip};
use crate::kelvin::Rgb;

pub struct ConsoleStrip {
    count: usize,
    current: Option<Rgb>,
}

impl ConsoleStrip {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            current: None,
        }
    }

    /// Last color shown
    pub fn current(&self) -> Option<Rgb> {
        self.current
    }
}

impl Strip for ConsoleStrip {
    fn backend_name(&self) -> &str {
        "console"
    }

    fn pixel_count(&self) -> usize {
        self.count
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), Error> {
        if self.current != Some(color) {
            tracing::info!(
                r = color.r,
                g = color.g,
                b = color.b,
                pixels = self.count,
                "strip color"
            );
        }
        self.current = Some(color);
        Ok(())
    }
}
