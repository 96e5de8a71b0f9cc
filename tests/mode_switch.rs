use std::time::Duration;

use irislink::device::capabilities::{has_capabilities, Capability};
use irislink::device::workflow::{cleanup_session, ensure_mode};
use irislink::device::{DeviceManager, DeviceMode};
use irislink::testing::{RecordingConnector, ScriptedPort, ScriptedPorts};
use irislink::SessionConfig;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn wifi_board_switched_to_uvc_and_cleaned_up() -> anyhow::Result<()> {
    let config = SessionConfig::from_key_values("SWITCH_MODE_REBOOT_TIME=6\nCOMMAND_TIMEOUT=2\n")?;
    assert!(has_capabilities("esp_eye", &[Capability::Wired, Capability::Wireless])?);

    let connector = RecordingConnector::new();
    let (mut wifi, wifi_log) = ScriptedPort::new();
    wifi.reply_success(json!({"mode": "WiFi", "value": 1}));
    wifi.reply_success(json!("Device mode switched, restart to apply"));
    wifi.reply_success(json!("Device restarting"));
    connector.prepare("/dev/ttyUSB0", wifi);

    let (mut uvc, uvc_log) = ScriptedPort::new();
    // first read after boot drains the log output
    uvc.reply_chunks(&["I (1203) camera: sensor ready\r\n"]);
    uvc.reply_success(json!({"mode": "UVC", "value": 0}));
    uvc.reply_success(json!("Config reset"));
    uvc.reply_success(json!("Device restarting"));
    connector.prepare("/dev/ttyACM0", uvc);

    let mut manager = DeviceManager::init(
        connector.clone(),
        "/dev/ttyUSB0",
        config.settle_duration(),
        config.command_timeout(),
    )
    .await?;
    let ports = ScriptedPorts::new(&[&["/dev/ttyUSB0"], &["/dev/ttyACM0"]]);

    let client = ensure_mode(&mut manager, &ports, DeviceMode::Uvc).await?;
    assert_eq!(client.port_name(), Some("/dev/ttyACM0"));

    assert!(client.send("get_device_mode", None, None).await.has_failed());
    assert_eq!(client.get_device_mode().await?, DeviceMode::Uvc);

    cleanup_session(&mut manager).await?;

    assert_eq!(wifi_log.writes().len(), 3);
    assert_eq!(uvc_log.writes().len(), 4);
    assert_eq!(wifi_log.closed(), 1);
    assert_eq!(uvc_log.closed(), 1);
    Ok(())
}
