//! Color temperature to RGB.
//!
//! Piecewise curve fit over temperature / 100, one curve per channel,
//! each channel clamped to [0, 255] and rounded. Accurate over roughly
//! 1000K..40000K; anything positive still yields an in-range color.

use smart_leds::RGB8;

pub type Rgb = RGB8;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("temperature {0} is not a finite number")]
    NotFinite(f64),
    #[error("temperature {0}K is not positive")]
    NotPositive(f64),
}

fn channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

/// Convert a Kelvin temperature to an RGB color.
pub fn convert(temperature: f64) -> Result<Rgb, DomainError> {
    if !temperature.is_finite() {
        return Err(DomainError::NotFinite(temperature));
    }
    // ln(t) below is the only logarithm whose argument can reach zero
    if temperature <= 0.0 {
        return Err(DomainError::NotPositive(temperature));
    }

    let t = temperature / 100.0;

    let red = if t <= 66.0 {
        255.0
    } else {
        329.698727446 * (t - 60.0).powf(-0.1332047592)
    };

    let green = if t <= 66.0 {
        99.4708025861 * t.ln() - 161.1195681661
    } else {
        288.1221695283 * (t - 60.0).powf(-0.0755148492)
    };

    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.5177312231 * (t - 10.0).ln() - 305.0447927307
    };

    Ok(Rgb {
        r: channel(red),
        g: channel(green),
        b: channel(blue),
    })
}
