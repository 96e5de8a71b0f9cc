//! Typed wrappers for the firmware commands the session workflows rely on
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::serial::{CommandClient, Response};
use super::{DeviceError, DeviceMode, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub who_am_i: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialInfo {
    pub serial: String,
    pub mac: String,
}

#[derive(Debug, Deserialize)]
struct ModeReport {
    mode: String,
}

fn failure_reason(response: &Response) -> String {
    if let Some(error) = response.error() {
        return error.to_string();
    }
    match response.data() {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => format!("status {:?}", response.status()),
        Some(other) => other.to_string(),
    }
}

impl CommandClient {
    /// Send and turn a failed exchange into `DeviceError::CommandFailed`
    pub async fn execute(&mut self, command: &str, params: Option<Value>) -> Result<Response> {
        let response = self.send(command, params, None).await;
        if response.has_failed() {
            return Err(DeviceError::CommandFailed {
                command: command.to_string(),
                reason: failure_reason(&response),
            });
        }
        Ok(response)
    }

    async fn query<T: DeserializeOwned>(&mut self, command: &str) -> Result<T> {
        let response = self.execute(command, None).await?;
        let data = response.data().cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| DeviceError::UnexpectedResponse {
            command: command.to_string(),
            reason: e.to_string(),
        })
    }

    async fn query_field<T: DeserializeOwned>(&mut self, command: &str, key: &str) -> Result<T> {
        let response = self.execute(command, None).await?;
        response
            .data_field(key)
            .ok_or_else(|| DeviceError::UnexpectedResponse {
                command: command.to_string(),
                reason: format!("missing or invalid '{}'", key),
            })
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.execute("ping", None).await.map(|_| ())
    }

    pub async fn get_device_mode(&mut self) -> Result<DeviceMode> {
        let report: ModeReport = self.query("get_device_mode").await?;
        report.mode.parse().map_err(|_| DeviceError::UnexpectedResponse {
            command: "get_device_mode".to_string(),
            reason: format!("unrecognised mode '{}'", report.mode),
        })
    }

    /// Takes effect after the next restart
    pub async fn switch_mode(&mut self, mode: DeviceMode) -> Result<()> {
        let wire_name = mode
            .wire_name()
            .ok_or_else(|| DeviceError::UnsupportedMode(mode.to_string()))?;
        self.execute("switch_mode", Some(json!({ "mode": wire_name })))
            .await
            .map(|_| ())
    }

    pub async fn restart_device(&mut self) -> Result<()> {
        self.execute("restart_device", None).await.map(|_| ())
    }

    /// Reset one config section, or everything with `"all"`
    pub async fn reset_config(&mut self, section: &str) -> Result<()> {
        self.execute("reset_config", Some(json!({ "section": section })))
            .await
            .map(|_| ())
    }

    pub async fn get_who_am_i(&mut self) -> Result<WhoAmI> {
        self.query("get_who_am_i").await
    }

    pub async fn get_serial(&mut self) -> Result<SerialInfo> {
        self.query("get_serial").await
    }

    pub async fn get_mdns_name(&mut self) -> Result<String> {
        self.query_field("get_mdns_name", "hostname").await
    }

    pub async fn set_mdns(&mut self, hostname: &str) -> Result<()> {
        self.execute("set_mdns", Some(json!({ "hostname": hostname })))
            .await
            .map(|_| ())
    }

    pub async fn get_led_duty_cycle(&mut self) -> Result<u8> {
        self.query_field("get_led_duty_cycle", "led_external_pwm_duty_cycle")
            .await
    }

    /// Percent, 0..=100; the firmware rejects anything else
    pub async fn set_led_duty_cycle(&mut self, duty_cycle: u8) -> Result<()> {
        self.execute("set_led_duty_cycle", Some(json!({ "dutyCycle": duty_cycle })))
            .await
            .map(|_| ())
    }

    /// Only boards with current measurement support this.
    ///
    /// The firmware formats the reading as a string ("12.500").
    pub async fn get_led_current(&mut self) -> Result<f64> {
        let reading: Value = self.query_field("get_led_current", "led_current_ma").await?;
        let current = match &reading {
            Value::String(text) => text.trim().parse::<f64>().ok(),
            Value::Number(number) => number.as_f64(),
            _ => None,
        };
        current.ok_or_else(|| DeviceError::UnexpectedResponse {
            command: "get_led_current".to_string(),
            reason: format!("invalid 'led_current_ma': {}", reading),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{LinkSettings, SerialInterface};
    use crate::testing::{PortLog, ScriptedPort};
    use pretty_assertions::assert_eq;

    fn client(script: impl FnOnce(&mut ScriptedPort)) -> (CommandClient, PortLog) {
        let (mut port, log) = ScriptedPort::new();
        script(&mut port);
        let link = SerialInterface::from_io("COM5", Box::new(port), LinkSettings::default());
        let client = CommandClient::new(link).with_default_timeout(std::time::Duration::from_secs(1));
        (client, log)
    }

    #[tokio::test(start_paused = true)]
    async fn reads_device_mode() {
        let (mut client, _) = client(|p| p.reply_success(json!({"mode": "WiFi", "value": 1})));
        assert_eq!(client.get_device_mode().await.unwrap(), DeviceMode::Wifi);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_mode_sends_wire_name() {
        let (mut client, log) = client(|p| p.reply_success(json!("Device mode switched, restart to apply")));
        client.switch_mode(DeviceMode::Uvc).await.unwrap();
        assert_eq!(
            log.writes(),
            vec!["{\"commands\":[{\"command\":\"switch_mode\",\"data\":{\"mode\":\"uvc\"}}]}\n".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_command_carries_firmware_message() {
        let (mut client, _) = client(|p| p.reply_failure(json!("Invalid payload - missing dutyCycle")));
        let err = client.set_led_duty_cycle(150).await.unwrap_err();
        match err {
            DeviceError::CommandFailed { command, reason } => {
                assert_eq!(command, "set_led_duty_cycle");
                assert_eq!(reason, "Invalid payload - missing dutyCycle");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_command_failure() {
        let (mut client, _) = client(|_| {});
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, DeviceError::CommandFailed { ref reason, .. } if reason == "Command timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn typed_queries() {
        let (mut client, _) = client(|p| {
            p.reply_success(json!({"who_am_i": "esp_eye", "version": "1.2.0"}));
            p.reply_success(json!({"serial": "A1B2C3", "mac": "aa:bb:cc:dd:ee:ff"}));
            p.reply_success(json!({"hostname": "tracker-left"}));
            p.reply_success(json!({"led_external_pwm_duty_cycle": 100}));
            p.reply_success(json!({"led_current_ma": "12.500"}));
        });

        let who = client.get_who_am_i().await.unwrap();
        assert_eq!(who.who_am_i, "esp_eye");
        assert_eq!(client.get_serial().await.unwrap().mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(client.get_mdns_name().await.unwrap(), "tracker-left");
        assert_eq!(client.get_led_duty_cycle().await.unwrap(), 100);
        assert_eq!(client.get_led_current().await.unwrap(), 12.5);
    }

    #[tokio::test(start_paused = true)]
    async fn led_current_accepts_numbers_and_rejects_garbage() {
        let (mut client, _) = client(|p| {
            p.reply_success(json!({"led_current_ma": 7.25}));
            p.reply_success(json!({"led_current_ma": "n/a"}));
        });
        assert_eq!(client.get_led_current().await.unwrap(), 7.25);
        assert!(matches!(
            client.get_led_current().await,
            Err(DeviceError::UnexpectedResponse { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unsettled_mode_is_reported_as_unknown() {
        let (mut client, _) = client(|p| {
            p.reply_success(json!({"mode": "unknown", "value": 3}));
            p.reply_success(json!({"mode": "Sleeping", "value": 4}));
        });
        assert_eq!(client.get_device_mode().await.unwrap(), DeviceMode::Unknown);
        assert!(matches!(
            client.get_device_mode().await,
            Err(DeviceError::UnexpectedResponse { ref command, .. }) if command == "get_device_mode"
        ));
    }

    #[tokio::test]
    async fn unknown_mode_is_never_sent() {
        let (mut client, log) = client(|_| {});
        assert!(matches!(
            client.switch_mode(DeviceMode::Unknown).await,
            Err(DeviceError::UnsupportedMode(_))
        ));
        assert!(log.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_field_is_unexpected_response() {
        let (mut client, _) = client(|p| p.reply_success(json!({"name": "x"})));
        assert!(matches!(
            client.get_mdns_name().await,
            Err(DeviceError::UnexpectedResponse { .. })
        ));
    }
}
