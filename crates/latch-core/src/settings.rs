//! Process configuration.
//!
//! Settings are read from a TOML file. Every section and every key has a
//! default, so a file only needs the values that differ on a given site
//! (typically device paths, the country prefix and the roster location).
//!
//! ```
//! use latch_core::Settings;
//!
//! let settings = Settings::from_toml_str(r#"
//!     [door]
//!     lock_serial_device = "/dev/ttyAMA0"
//!     phone_open_time_secs = 8
//!
//!     [membership]
//!     grace_period_days = 7
//! "#).unwrap();
//!
//! assert_eq!(settings.door.unlock_duration().as_secs(), 8);
//! assert_eq!(settings.membership.grace_period_days, 7);
//! ```

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete process configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub door: DoorSettings,
    pub modem: ModemSettings,
    pub reader: ReaderSettings,
    pub membership: MembershipSettings,
    pub presence: PresenceSettings,
    pub ring: RingSettings,
    pub roster: RosterSettings,
}

impl Settings {
    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed TOML and
    /// [`Error::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Render the effective settings back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let unlock = self.door.unlock_duration();
        if unlock.is_zero() || unlock >= MAX_UNLOCK_DURATION {
            return Err(Error::invalid_config(
                "door.phone_open_time_secs",
                format!(
                    "must be between 1 and {}",
                    MAX_UNLOCK_DURATION.as_secs() - 1
                ),
            ));
        }

        for (key, baud) in [
            ("door.baud_rate", self.door.baud_rate),
            ("modem.baud_rate", self.modem.baud_rate),
            ("reader.baud_rate", self.reader.baud_rate),
        ] {
            if baud < BITS_PER_BYTE {
                return Err(Error::invalid_config(key, format!("baud rate {baud} too low")));
            }
        }

        if self.door.sensor_poll_ms == 0 {
            return Err(Error::invalid_config("door.sensor_poll_ms", "must be positive"));
        }

        if self.reader.response_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "reader.response_timeout_ms",
                "must be positive",
            ));
        }

        Ok(())
    }
}

/// Lock relay line and door switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorSettings {
    /// Serial device driving the lock relay.
    pub lock_serial_device: String,

    /// Baud rate of the relay line; sets the pulse byte budget.
    pub baud_rate: u32,

    /// GPIO value file of the door switch (`/sys/class/gpio/gpioN/value`).
    pub switch_gpio_path: PathBuf,

    /// Switch level that means "open" (the switch is wired with a pull-up).
    pub switch_open_level: bool,

    /// Door switch sampling interval in milliseconds.
    pub sensor_poll_ms: u64,

    /// How long an authorized ring or tag keeps the door unlocked.
    pub phone_open_time_secs: u64,

    /// Door held open at least this long is relocked when it closes.
    pub relock_debounce_secs: u64,
}

impl DoorSettings {
    pub fn unlock_duration(&self) -> Duration {
        Duration::from_secs(self.phone_open_time_secs)
    }

    pub fn relock_debounce(&self) -> Duration {
        Duration::from_secs(self.relock_debounce_secs)
    }

    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_ms)
    }
}

impl Default for DoorSettings {
    fn default() -> Self {
        Self {
            lock_serial_device: "/dev/ttyAMA0".to_string(),
            baud_rate: DEFAULT_LOCK_BAUD_RATE,
            switch_gpio_path: PathBuf::from("/sys/class/gpio/gpio18/value"),
            switch_open_level: true,
            sensor_poll_ms: DEFAULT_SENSOR_POLL_INTERVAL.as_millis() as u64,
            phone_open_time_secs: DEFAULT_UNLOCK_DURATION.as_secs(),
            relock_debounce_secs: DEFAULT_RELOCK_DEBOUNCE.as_secs(),
        }
    }
}

/// Cellular modem control port and discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemSettings {
    /// TTY exposed by the modem in modem mode.
    pub serial_port: String,

    pub baud_rate: u32,

    /// Prefix replacing a leading `0` in caller numbers.
    pub default_country_prefix: String,

    /// `vendor:product` of the modem while it poses as a storage device.
    pub mode_switch_usb_id: Option<String>,

    /// Shell command switching the modem into modem mode.
    pub mode_switch_command: Option<String>,

    /// Probe or reopen the modem after this many silent seconds.
    pub poll_interval_secs: u64,

    /// End a ring after this many seconds without a caller-ID refresh.
    pub ring_timeout_secs: u64,
}

impl ModemSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB2".to_string(),
            baud_rate: DEFAULT_MODEM_BAUD_RATE,
            default_country_prefix: "+358".to_string(),
            mode_switch_usb_id: None,
            mode_switch_command: None,
            poll_interval_secs: DEFAULT_MODEM_POLL_INTERVAL.as_secs(),
            ring_timeout_secs: DEFAULT_RING_TIMEOUT.as_secs(),
        }
    }
}

/// Terminal (RFID reader, display, buzzer) link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Serial port of the terminal; the terminal is disabled when unset.
    pub serial_port: Option<String>,

    pub baud_rate: u32,

    pub response_timeout_ms: u64,

    pub reconnect_backoff_ms: u64,

    pub tag_repeat_window_ms: u64,
}

impl ReaderSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn tag_repeat_window(&self) -> Duration {
        Duration::from_millis(self.tag_repeat_window_ms)
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: DEFAULT_READER_BAUD_RATE,
            response_timeout_ms: DEFAULT_READER_RESPONSE_TIMEOUT.as_millis() as u64,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF.as_millis() as u64,
            tag_repeat_window_ms: DEFAULT_TAG_REPEAT_WINDOW.as_millis() as u64,
        }
    }
}

/// Membership expiry policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipSettings {
    /// Let expired members in for this many days (0 disables).
    pub grace_period_days: u32,

    /// Announce remaining days when at most this many are left (0 disables).
    pub remaining_message_days: u32,

    /// Treat `days_left == 0` as expired instead of as the last active day.
    pub day_zero_is_expired: bool,
}

/// Room presence tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Lights off and door closed for this long means the room is empty.
    pub leave_delay_secs: u64,

    /// Minimum gap between two "member opened the door" messages.
    pub renotify_secs: u64,
}

impl PresenceSettings {
    pub fn leave_delay(&self) -> Duration {
        Duration::from_secs(self.leave_delay_secs)
    }

    pub fn renotify_interval(&self) -> Duration {
        Duration::from_secs(self.renotify_secs)
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            leave_delay_secs: 60,
            renotify_secs: 8 * 60 * 60,
        }
    }
}

/// Call handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingSettings {
    /// Delay between the decision on a ring and hanging up.
    pub hangup_delay_ms: u64,

    /// Post-open notices older than this are dropped.
    pub notice_window_secs: u64,
}

impl RingSettings {
    pub fn hangup_delay(&self) -> Duration {
        Duration::from_millis(self.hangup_delay_ms)
    }

    pub fn notice_window(&self) -> Duration {
        Duration::from_secs(self.notice_window_secs)
    }
}

impl Default for RingSettings {
    fn default() -> Self {
        Self {
            hangup_delay_ms: DEFAULT_HANGUP_DELAY.as_millis() as u64,
            notice_window_secs: DEFAULT_NOTICE_WINDOW.as_secs(),
        }
    }
}

/// Member roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterSettings {
    /// JSON roster cache file.
    pub path: PathBuf,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("members.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.door.unlock_duration(), DEFAULT_UNLOCK_DURATION);
        assert_eq!(settings.modem.ring_timeout(), DEFAULT_RING_TIMEOUT);
        assert_eq!(settings.reader.tag_repeat_window(), DEFAULT_TAG_REPEAT_WINDOW);
        assert_eq!(settings.ring.notice_window(), DEFAULT_NOTICE_WINDOW);
        assert!(settings.reader.serial_port.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let settings = Settings::from_toml_str(
            r#"
            [modem]
            default_country_prefix = "+46"
            mode_switch_usb_id = "12d1:151a"

            [presence]
            leave_delay_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(settings.modem.default_country_prefix, "+46");
        assert_eq!(settings.modem.mode_switch_usb_id.as_deref(), Some("12d1:151a"));
        assert_eq!(settings.modem.baud_rate, DEFAULT_MODEM_BAUD_RATE);
        assert_eq!(settings.presence.leave_delay(), Duration::from_secs(120));
        assert_eq!(settings.presence.renotify_secs, 8 * 60 * 60);
    }

    #[rstest]
    #[case(0)]
    #[case(30)]
    #[case(45)]
    fn test_unlock_duration_out_of_range(#[case] secs: u64) {
        let text = format!("[door]\nphone_open_time_secs = {secs}\n");
        let err = Settings::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Settings::from_toml_str("[door\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_baud_rejected() {
        let err = Settings::from_toml_str("[reader]\nbaud_rate = 0\n").unwrap_err();
        assert!(err.to_string().contains("reader.baud_rate"));
    }

    #[test]
    fn test_load_from_file_and_render() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reader]\nserial_port = \"/dev/ttyACM0\"").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.reader.serial_port.as_deref(), Some("/dev/ttyACM0"));

        let rendered = settings.to_toml_string().unwrap();
        let reparsed = Settings::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, settings);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load("/nonexistent/latch.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
