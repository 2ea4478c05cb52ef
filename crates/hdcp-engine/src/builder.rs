//! Engine builder for configuration.

use std::sync::{Arc, Mutex};

use hdcp_core::{EngineConfig, Result, RetryLimits, Timeouts};
use hdcp_ddc::{DdcBus, DdcEngine};
use hdcp_keystore::KeyStore;
use hdcp_srm::{RevocationValidator, SrmList};

use crate::dispatcher::Dispatcher;
use crate::events::{EventHandler, NoOpHandler};
use crate::hardware::{HdcpHardware, LinkControl};

/// Builder for configuring a [`Dispatcher`].
pub struct EngineBuilder {
    config: EngineConfig,
    srm: Arc<SrmList>,
    event_handler: Option<Box<dyn EventHandler>>,
    repeater_class: bool,
}

impl EngineBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            srm: Arc::new(SrmList::empty()),
            event_handler: None,
            repeater_class: false,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn retries(mut self, retries: RetryLimits) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn tick_interval_ms(mut self, ms: u32) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    /// Mute audio/video while authentication is in progress.
    pub fn mute_during_auth(mut self, enabled: bool) -> Self {
        self.config.mute_during_auth = enabled;
        self
    }

    /// Revocation list shared with other links.
    pub fn srm(mut self, srm: Arc<SrmList>) -> Self {
        self.srm = srm;
        self
    }

    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.event_handler = Some(Box::new(handler));
        self
    }

    /// Run as the output stage of an HDMI repeater.
    pub fn repeater_class(mut self, enabled: bool) -> Self {
        self.repeater_class = enabled;
        self
    }

    /// Build a dispatcher owning its DDC bus.
    pub fn build<B, K, H, L>(self, bus: B, keystore: K, hw: H, link: L) -> Result<Dispatcher<B, K, H, L>>
    where
        B: DdcBus,
        K: KeyStore,
        H: HdcpHardware,
        L: LinkControl,
    {
        self.build_shared(Arc::new(Mutex::new(bus)), keystore, hw, link)
    }

    /// Build a dispatcher on a DDC bus shared with other bus users.
    pub fn build_shared<B, K, H, L>(
        self,
        bus: Arc<Mutex<B>>,
        keystore: K,
        hw: H,
        link: L,
    ) -> Result<Dispatcher<B, K, H, L>>
    where
        B: DdcBus,
        K: KeyStore,
        H: HdcpHardware,
        L: LinkControl,
    {
        self.config.validate()?;
        let ddc = DdcEngine::with_shared_bus(bus, self.config.ddc.clone());
        let events = self
            .event_handler
            .unwrap_or_else(|| Box::new(NoOpHandler));
        Ok(Dispatcher::new(
            ddc,
            keystore,
            hw,
            link,
            RevocationValidator::new(self.srm),
            self.config,
            events,
            self.repeater_class,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
