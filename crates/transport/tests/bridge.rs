//! Telephony bridge scenarios against in-process providers.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::mpsc;

use voice_gateway_core::InMemoryConversationLog;
use voice_gateway_llm::ScriptedBackend;
use voice_gateway_pipeline::testing::{CapturingTextToSpeech, InjectedSpeechToText};
use voice_gateway_pipeline::{OrchestratorConfig, OutboundAudioSink, VoiceSessionOrchestrator};
use voice_gateway_transport::{FrameDisposition, TelephonyBridge};

const GREETING: &str = "Hello! How can I help you today?";

struct Harness {
    bridge: Arc<TelephonyBridge>,
    stt: Arc<InjectedSpeechToText>,
    tts: Arc<CapturingTextToSpeech>,
    orchestrator: Arc<VoiceSessionOrchestrator>,
}

async fn harness() -> Harness {
    let stt = Arc::new(InjectedSpeechToText::new());
    let tts = Arc::new(CapturingTextToSpeech::new());

    let orchestrator = Arc::new(VoiceSessionOrchestrator::new(
        "CA-test",
        OrchestratorConfig::default(),
        stt.clone(),
        tts.clone(),
        Arc::new(ScriptedBackend::with_reply("Understood.")),
        Arc::new(InMemoryConversationLog::new()),
    ));

    let bridge = Arc::new(TelephonyBridge::new(
        "CA-test",
        GREETING,
        orchestrator.clone(),
    ));
    orchestrator.set_output(bridge.clone() as Arc<dyn OutboundAudioSink>);
    orchestrator.init().await.expect("init");

    Harness {
        bridge,
        stt,
        tts,
        orchestrator,
    }
}

fn media_frame(payload: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": "MZ1",
        "media": {"payload": BASE64.encode(payload), "timestamp": "0", "track": "inbound", "chunk": "1"},
    })
    .to_string()
}

fn greeting_count(tts: &CapturingTextToSpeech) -> usize {
    tts.spoken()
        .iter()
        .filter(|(text, _)| text == GREETING)
        .count()
}

#[tokio::test]
async fn greeting_exactly_once_in_normal_order() {
    let h = harness().await;

    h.bridge
        .handle_frame(r#"{"event": "connected", "protocol": "Call"}"#)
        .await;
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1", "start": {"callSid": "CA-test", "streamSid": "MZ1"}}"#)
        .await;
    for _ in 0..5 {
        h.bridge.handle_frame(&media_frame(&[0xFF; 160])).await;
    }

    assert_eq!(greeting_count(&h.tts), 1);
    assert_eq!(h.bridge.stream_sid().as_deref(), Some("MZ1"));
}

#[tokio::test]
async fn greeting_exactly_once_when_media_arrives_before_start() {
    // Delivery order between connection-open and stream-start is not
    // guaranteed; media can even come first.
    let h = harness().await;

    h.bridge.handle_frame(&media_frame(&[0xFF; 160])).await;
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;
    h.bridge
        .handle_frame(r#"{"event": "connected"}"#)
        .await;
    h.bridge.handle_frame(&media_frame(&[0xFF; 160])).await;

    assert_eq!(greeting_count(&h.tts), 1);
    // The stream id was adopted from the media frame itself.
    assert_eq!(h.bridge.stream_sid().as_deref(), Some("MZ1"));
}

#[tokio::test]
async fn greeting_flag_survives_failed_synthesis() {
    let h = harness().await;
    // First dispatch fails; the flag must not reset, so no retry storm
    // and no duplicate greeting when the next event lands.
    h.tts.fail_connect();
    h.orchestrator.close().await;

    h.bridge.handle_frame(r#"{"event": "connected"}"#).await;
    assert!(h.bridge.greeting_sent());

    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;
    assert!(h.bridge.greeting_sent());
    assert_eq!(greeting_count(&h.tts), 0);
}

#[tokio::test]
async fn inbound_media_reaches_stt_decoded() {
    let h = harness().await;
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;

    let payload = vec![0x12u8, 0x34, 0x56, 0x78];
    h.bridge.handle_frame(&media_frame(&payload)).await;

    let frames = h.stt.received_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, payload);
    assert_eq!(frames[0].encoding, voice_gateway_core::AudioEncoding::MuLaw);
}

#[tokio::test]
async fn outbound_audio_is_framed_and_fanned_out() {
    let h = harness().await;
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;

    let (tx_a, mut rx_a) = mpsc::channel::<String>(16);
    let (tx_b, mut rx_b) = mpsc::channel::<String>(16);
    h.bridge.register_connection(tx_a);
    h.bridge.register_connection(tx_b);

    // Greeting already fired on start; speak one more utterance and
    // check both connections got the framed audio.
    h.orchestrator.speak("One more thing.").await.unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        let raw = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out")
            .expect("closed");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ1");
        assert_eq!(value["media"]["track"], "outbound");
        assert_eq!(value["media"]["chunk"], "0");
        assert!(!value["media"]["payload"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn outbound_audio_without_stream_binding_is_dropped() {
    let h = harness().await;
    let (tx, mut rx) = mpsc::channel::<String>(16);
    h.bridge.register_connection(tx);

    // No start frame yet: nothing can be addressed.
    h.orchestrator.speak("Too early.").await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn stop_frame_tears_the_call_down() {
    let h = harness().await;
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;

    let disposition = h
        .bridge
        .handle_frame(r#"{"event": "stop", "streamSid": "MZ1"}"#)
        .await;

    assert_eq!(disposition, FrameDisposition::Stop);
    assert_eq!(h.bridge.stream_sid(), None);
    assert_eq!(
        h.orchestrator.state(),
        voice_gateway_pipeline::SessionState::Closed
    );
}

#[tokio::test]
async fn malformed_frames_are_skipped_not_fatal() {
    let h = harness().await;

    assert_eq!(
        h.bridge.handle_frame("not json at all").await,
        FrameDisposition::Continue
    );
    assert_eq!(
        h.bridge.handle_frame(r#"{"event": "unknown-kind"}"#).await,
        FrameDisposition::Continue
    );

    // The session is still usable afterwards.
    h.bridge
        .handle_frame(r#"{"event": "start", "streamSid": "MZ1"}"#)
        .await;
    assert_eq!(h.bridge.stream_sid().as_deref(), Some("MZ1"));
}
