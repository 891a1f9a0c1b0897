//! Binary sensor proxy for a switch

use dm_core::attrs::{ATTR_DEVICE_CLASS, ATTR_FRIENDLY_NAME};
use dm_core::states::{STATE_OFF, STATE_ON, STATE_UNAVAILABLE};

use crate::context::{ProxyContext, Rendered};

/// A switch republished as a binary sensor
#[derive(Debug)]
pub struct ProxyBinarySensor {
    ctx: ProxyContext,
}

impl ProxyBinarySensor {
    pub fn new(ctx: ProxyContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProxyContext {
        &self.ctx
    }

    /// `None` while the source is unknown
    pub fn is_on(&self) -> Option<bool> {
        self.ctx.snapshot().map(|s| s.is_on())
    }

    pub fn device_class(&self) -> Option<&str> {
        self.ctx.coordinator().config().device_class.as_deref()
    }

    pub fn render(&self) -> Rendered {
        let snapshot = self.ctx.snapshot();
        let state = match snapshot.as_deref() {
            None => STATE_UNAVAILABLE,
            Some(s) if s.is_on() => STATE_ON,
            Some(_) => STATE_OFF,
        };

        let mut rendered = Rendered::new(state);
        rendered.set(ATTR_FRIENDLY_NAME, self.ctx.name());
        if let Some(device_class) = self.device_class() {
            rendered.set(ATTR_DEVICE_CLASS, device_class);
        }
        rendered
            .attributes
            .extend(self.ctx.extra_attributes(snapshot.as_deref()));
        rendered
    }
}
