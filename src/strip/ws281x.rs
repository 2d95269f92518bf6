//! WS281x strips on a Raspberry Pi through rpi_ws281x.
//!
//! Needs /dev/mem (PWM/PCM) or /dev/spidev0.0 (pin 10) access.

use rs_ws281x::{ChannelBuilder, Controller, ControllerBuilder, StripType};

use super::{Error, Strip};
use crate::config::StripConfig;
use crate::kelvin::Rgb;

pub struct Ws281xStrip {
    controller: Controller,
    channel: usize,
    count: usize,
}

impl Ws281xStrip {
    pub fn init(config: &StripConfig) -> Result<Self, Error> {
        let count = i32::try_from(config.count)
            .map_err(|_| Error::Hardware(format!("{} pixels is too many", config.count)))?;

        let channel = ChannelBuilder::new()
            .pin(config.pin)
            .count(count)
            .strip_type(StripType::Ws2812)
            .brightness(config.brightness)
            .invert(config.invert)
            .build();

        let controller = ControllerBuilder::new()
            .freq(config.freq_hz)
            .dma(config.dma)
            .channel(config.channel, channel)
            .build()
            .map_err(|e| Error::Hardware(format!("init: {e:?}")))?;

        tracing::info!(
            pin = config.pin,
            count = config.count,
            dma = config.dma,
            channel = config.channel,
            "ws281x strip ready"
        );

        Ok(Self {
            controller,
            channel: config.channel,
            count: config.count,
        })
    }
}

impl Strip for Ws281xStrip {
    fn backend_name(&self) -> &str {
        "ws281x"
    }

    fn pixel_count(&self) -> usize {
        self.count
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), Error> {
        // raw layout is [B, G, R, W]; the driver reorders for the wire
        for led in self.controller.leds_mut(self.channel) {
            *led = [color.b, color.g, color.r, 0];
        }
        self.controller
            .render()
            .map_err(|e| Error::Hardware(format!("render: {e:?}")))
    }
}
