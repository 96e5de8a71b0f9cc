use std::time::Duration;

use irislink::serial::{CommandClient, FrameAssembler, LinkSettings, Response, SerialInterface};
use irislink::testing::{ScriptStep, ScriptedPort};
use serde_json::json;

const OK_RESPONSE: &str = r#"{"results":[{"result":{"status":"success","data":{}}}]}"#;

fn client(port: ScriptedPort) -> CommandClient {
    let _ = env_logger::builder().is_test(true).try_init();
    let link = SerialInterface::from_io("/dev/ttyACM0", Box::new(port), LinkSettings::default());
    CommandClient::new(link)
}

#[tokio::test(start_paused = true)]
async fn message_split_at_every_byte_is_returned_once() {
    let (mut port, _log) = ScriptedPort::new();
    let steps = OK_RESPONSE
        .bytes()
        .flat_map(|b| [ScriptStep::Chunk(vec![b]), ScriptStep::Delay(Duration::from_millis(20))])
        .collect();
    port.reply(steps);
    let mut client = client(port);

    let response = client.send("ping", None, None).await;
    assert!(!response.has_failed());

    // nothing left over for the next exchange
    let second = client.send("ping", None, Some(Duration::from_secs(1))).await;
    assert_eq!(second, Response::error_message("Command timeout"));
}

#[tokio::test(start_paused = true)]
async fn boot_noise_never_reaches_the_result() {
    let (mut port, _log) = ScriptedPort::new();
    port.reply_chunks(&[
        "ESP-ROM:esp32s3-20210327\r\n",
        "rst:0x1 (POWERON),boot:0x8 (SPI_FAST_FLASH_BOOT)\r\n",
        "I (25) boot: ESP-IDF v5.3\r\n",
        "I (27) boot: compile time Jan  1 2025\r\n",
        "I (31) main: starting\r\n",
        r#"{"results":[{"result":"#,
        r#"{"status":"success","data":{"mode":"UVC","#,
        r#""value":0}}}]}"#,
    ]);
    let mut client = client(port);

    let response = client.send("get_device_mode", None, None).await;

    assert!(!response.has_failed());
    assert_eq!(response.data(), Some(&json!({"mode": "UVC", "value": 0})));
}

#[tokio::test(start_paused = true)]
async fn assembler_can_be_driven_directly() {
    let (mut port, _log) = ScriptedPort::new();
    port.queue_chunk("noise\n");
    port.queue_delay(Duration::from_millis(500));
    port.queue_chunk(OK_RESPONSE);
    let mut link = SerialInterface::from_io("COM4", Box::new(port), LinkSettings::default());

    let mut assembler = FrameAssembler::new();
    let message = assembler
        .assemble(&mut link, Duration::from_secs(1))
        .await
        .unwrap()
        .expect("message before deadline");

    assert!(!Response::from_message(message).has_failed());
}

#[tokio::test(start_paused = true)]
async fn invalid_command_is_a_command_failure_not_a_transport_error() {
    let (mut port, _log) = ScriptedPort::new();
    port.reply_failure(json!("Unknown command"));
    let mut client = client(port);

    let response = client
        .send("some_invalid_command", Some(json!({"param": "invalid"})), None)
        .await;

    assert!(response.has_failed());
    assert_eq!(response.error(), None);
}
