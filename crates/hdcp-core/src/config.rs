//! Engine configuration.
//!
//! All durations are in milliseconds. Every field has a default matching the
//! timing budget of the HDCP 1.4 / 2.2 transmitter specifications, so a
//! partial JSON document only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// State timeouts in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Settle time after a mode change before HDCP 1.x starts.
    pub res_chg_ok_ms: u32,
    /// Time the sink is given to compute R0'.
    pub r0_ms: u32,
    /// BCAPS re-read interval when the sink did not answer.
    pub bcaps_retry_ms: u32,
    /// BSTATUS re-read interval while waiting for HDMI mode.
    pub hdmi_mode_retry_ms: u32,
    /// KSV FIFO ready poll interval.
    pub ksv_list_poll_ms: u32,
    /// Time the hardware hash engine is given to produce V.
    pub v_ready_ms: u32,
    /// Back-off before retrying a failed 1.x authentication.
    pub redo_backoff_ms: u32,

    /// Settle time before HDCP 2.x starts, firmware already loaded.
    pub hdcp2_res_chg_ok_ms: u32,
    /// Settle time before HDCP 2.x starts, firmware not loaded yet.
    pub hdcp2_load_fw_ms: u32,
    /// Time the firmware is given to pass its code check.
    pub hdcp2_initial_ms: u32,
    pub hdcp2_ake_ms: u32,
    pub hdcp2_cert_ms: u32,
    /// Interval between done-bit polls in the 2.x Check states.
    pub hdcp2_poll_ms: u32,
    pub hdcp2_repeater_check_ms: u32,
    pub hdcp2_reset_receiver_ms: u32,
    pub hdcp2_repeat_msg_ms: u32,
    pub hdcp2_authen_check_ms: u32,
    /// Delay between auth-done and enabling encryption.
    pub hdcp2_encrypt_delay_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            res_chg_ok_ms: 500,
            r0_ms: 100,
            bcaps_retry_ms: 300,
            hdmi_mode_retry_ms: 300,
            ksv_list_poll_ms: 100,
            v_ready_ms: 500,
            redo_backoff_ms: 250,
            hdcp2_res_chg_ok_ms: 100,
            hdcp2_load_fw_ms: 300,
            hdcp2_initial_ms: 200,
            hdcp2_ake_ms: 20,
            hdcp2_cert_ms: 100,
            hdcp2_poll_ms: 10,
            hdcp2_repeater_check_ms: 100,
            hdcp2_reset_receiver_ms: 20,
            hdcp2_repeat_msg_ms: 20,
            hdcp2_authen_check_ms: 50,
            hdcp2_encrypt_delay_ms: 20,
        }
    }
}

/// Bounded retry counts per state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryLimits {
    /// R0 re-compares allowed after the R0 window expired.
    pub recompare_r0: u32,
    /// Consecutive Ri re-compares before re-authenticating.
    pub recompare_ri: u32,
    /// KSV FIFO ready polls (5 s at the default poll interval).
    pub ksv_list_ready: u32,
    /// BSTATUS re-reads while waiting for the HDMI mode bit.
    pub hdmi_mode: u32,
    /// BSTATUS re-reads when the device count exceeds the hardware limit.
    pub device_count_reread: u32,
    pub ake_polls: u32,
    pub cert_polls: u32,
    pub repeater_check_polls: u32,
    pub repeat_msg_polls: u32,
    pub authen_polls: u32,
    /// Consecutive 0x30 fault codes before the physical link is powered off.
    pub hw_fault_threshold: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            recompare_r0: 3,
            recompare_ri: 5,
            ksv_list_ready: 50,
            hdmi_mode: 15,
            device_count_reread: 2,
            ake_polls: 10,
            cert_polls: 20,
            repeater_check_polls: 30,
            repeat_msg_polls: 10,
            authen_polls: 25,
            hw_fault_threshold: 3,
        }
    }
}

/// DDC transaction engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdcConfig {
    /// Largest single read burst for ordinary registers.
    pub burst_len: usize,
    /// Largest single read burst from the KSV FIFO.
    pub ksv_fifo_burst_len: usize,
    /// Whole-transaction retries on Nack or Timeout.
    pub transaction_retries: u32,
    /// Wait after a clock-recovery pulse before re-checking the bus.
    pub settle_ms: u32,
}

impl Default for DdcConfig {
    fn default() -> Self {
        Self {
            burst_len: 16,
            ksv_fifo_burst_len: 64,
            transaction_retries: 3,
            settle_ms: 5,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dispatcher tick period.
    pub tick_interval_ms: u32,
    pub timeouts: Timeouts,
    pub retries: RetryLimits,
    pub ddc: DdcConfig,
    /// Downstream devices the 1.x KSV FIFO hardware can hold.
    pub max_ksv_devices: u8,
    /// Receiver IDs the 2.x status registers can hold.
    pub max_receiver_ids: u8,
    /// Mute audio/video while authentication is in progress.
    pub mute_during_auth: bool,
    /// Upper bound on fallthrough transitions within one dispatch.
    pub redispatch_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            timeouts: Timeouts::default(),
            retries: RetryLimits::default(),
            ddc: DdcConfig::default(),
            max_ksv_devices: 32,
            max_receiver_ids: 31,
            mute_during_auth: true,
            redispatch_limit: 16,
        }
    }
}

impl EngineConfig {
    /// Check values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval_ms",
                reason: "must be non-zero",
            });
        }
        if self.ddc.burst_len == 0 || self.ddc.ksv_fifo_burst_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ddc.burst_len",
                reason: "burst windows must be non-zero",
            });
        }
        if self.max_ksv_devices == 0 || self.max_ksv_devices > 127 {
            return Err(ConfigError::InvalidValue {
                field: "max_ksv_devices",
                reason: "must be within 1..=127",
            });
        }
        if self.max_receiver_ids == 0 || self.max_receiver_ids > 31 {
            return Err(ConfigError::InvalidValue {
                field: "max_receiver_ids",
                reason: "must be within 1..=31",
            });
        }
        if self.redispatch_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "redispatch_limit",
                reason: "must be non-zero",
            });
        }
        Ok(())
    }
}
