//! LED strip output with backend selection.
//!
//! Backends:
//!   1. ws281x (rpi_ws281x via PWM/PCM/SPI) - compiled with the "ws281x" feature
//!   2. console (tracing output) - always available
//!
//! `auto` tries them in that order.

pub mod console;

#[cfg(feature = "ws281x")]
pub mod ws281x;

use crate::config::{BackendChoice, StripConfig};
use crate::kelvin::Rgb;

pub use console::ConsoleStrip;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("LED driver failure: {0}")]
    Hardware(String),
    #[error("backend {0} not compiled in")]
    Unavailable(&'static str),
    #[error("strip has no pixels")]
    Empty,
}

/// Something that can show one color on every pixel
pub trait Strip {
    fn backend_name(&self) -> &str;

    fn pixel_count(&self) -> usize;

    /// Set every pixel to `color` and make it visible
    fn set_all(&mut self, color: Rgb) -> Result<(), Error>;

    /// All pixels dark
    fn blank(&mut self) -> Result<(), Error> {
        self.set_all(Rgb { r: 0, g: 0, b: 0 })
    }
}

impl<S: Strip + ?Sized> Strip for Box<S> {
    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }

    fn pixel_count(&self) -> usize {
        (**self).pixel_count()
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), Error> {
        (**self).set_all(color)
    }
}

#[cfg(feature = "ws281x")]
fn open_ws281x(config: &StripConfig) -> Result<Box<dyn Strip>, Error> {
    Ok(Box::new(ws281x::Ws281xStrip::init(config)?))
}

#[cfg(not(feature = "ws281x"))]
fn open_ws281x(_config: &StripConfig) -> Result<Box<dyn Strip>, Error> {
    Err(Error::Unavailable("ws281x"))
}

/// Open the configured backend.
pub fn init(config: &StripConfig) -> Result<Box<dyn Strip>, Error> {
    if config.count == 0 {
        return Err(Error::Empty);
    }

    match config.backend {
        BackendChoice::Ws281x => open_ws281x(config),
        BackendChoice::Console => Ok(Box::new(ConsoleStrip::new(config.count))),
        BackendChoice::Auto => match open_ws281x(config) {
            Ok(strip) => Ok(strip),
            Err(e) => {
                tracing::info!(error = %e, "ws281x unavailable, using console output");
                Ok(Box::new(ConsoleStrip::new(config.count)))
            }
        },
    }
}
