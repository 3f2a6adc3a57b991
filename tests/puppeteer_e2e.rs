use browser_puppeteer::dom::MemoryDocument;
use browser_puppeteer::protocol::CapturedEventType;
use browser_puppeteer::{
    BrowserError, BrowserPuppet, BrowserPuppeteer, CapturedEvent, ChannelOptions, Command,
    Document, DomEvent, DownstreamMessage, ElementNode, JsFunction, Jsonf, PuppetConfig,
    PuppeteerConfig, PuppeteerEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const PUPPET_ID: u64 = 12345;

fn login_page() -> MemoryDocument {
    MemoryDocument::new(ElementNode::new("html").with_child(
        ElementNode::new("body").with_bounding_box(0.0, 0.0, 800.0, 600.0).with_children(vec![
            ElementNode::new("form").with_class("login").with_children(vec![
                ElementNode::new("input")
                    .with_id("user")
                    .with_bounding_box(10.0, 10.0, 200.0, 20.0),
                ElementNode::new("button")
                    .with_id("submit")
                    .with_text("Log in")
                    .with_bounding_box(10.0, 40.0, 80.0, 30.0),
            ]),
            ElementNode::new("div").with_class("toast").with_visibility(false),
        ]),
    ))
}

struct Recording {
    puppeteer: BrowserPuppeteer,
    document: Arc<MemoryDocument>,
    events: broadcast::Receiver<PuppeteerEvent>,
}

async fn connected() -> Recording {
    let puppeteer = BrowserPuppeteer::new(
        PuppeteerConfig::new()
            .port(0)
            .wait_for_connection_timeout(Duration::from_secs(5))
            .connection_poll_interval(Duration::from_millis(20)),
    );
    let events = puppeteer.subscribe();
    let addr = puppeteer.start().await.expect("controller should start");

    let document = Arc::new(login_page());
    let puppet = BrowserPuppet::new(document.clone());
    puppet
        .start(
            &PuppetConfig::new()
                .server_url(format!("ws://{}", addr))
                .puppet_id(PUPPET_ID)
                .channel(ChannelOptions::new().reconnect_interval(Duration::from_millis(50))),
        )
        .expect("puppet should start");

    puppeteer.wait_for_connection(None).await.expect("puppet should connect");
    Recording { puppeteer, document, events }
}

async fn next_captured(events: &mut broadcast::Receiver<PuppeteerEvent>) -> Option<CapturedEvent> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(PuppeteerEvent::CapturedEvent { event }) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    };
    tokio::time::timeout(Duration::from_millis(500), wait).await.ok().flatten()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_puppet_connects_with_its_id() {
    let mut recording = connected().await;

    assert_eq!(recording.puppeteer.puppet_id(), Some(PUPPET_ID));
    let event = tokio::time::timeout(Duration::from_secs(1), recording.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, PuppeteerEvent::PuppetConnected { puppet_id: PUPPET_ID });

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_click_is_acknowledged() {
    let recording = connected().await;

    let result = recording.puppeteer.exec_command(Command::click("#submit")).await;
    assert_eq!(result.unwrap(), None);

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_selector_is_naked() {
    let recording = connected().await;

    let err = recording.puppeteer.exec_command(Command::get_value("#missing")).await.unwrap_err();
    match err {
        BrowserError::Remote { message, .. } => {
            assert_eq!(message, "getValue: selector not found: \"#missing\"")
        }
        other => panic!("expected a nak, got {:?}", other),
    }

    // the session stays usable after a nak
    recording.puppeteer.exec_command(Command::set_value("#user", "alice")).await.unwrap();
    let value = recording.puppeteer.exec_command(Command::get_value("#user")).await.unwrap();
    assert_eq!(value, Some(Jsonf::from("alice")));

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_request_is_rejected_synchronously() {
    let recording = connected().await;

    let first = recording
        .puppeteer
        .send_message(DownstreamMessage::ExecCommand { command: Command::click("#submit") })
        .unwrap();
    let second = recording.puppeteer.send_message(DownstreamMessage::ClearPersistentData);

    let err = second.err().expect("second request should be refused");
    assert_eq!(err.kind(), "ConcurrencyViolationError");
    assert_eq!(
        err.to_string(),
        "Cannot send multiple messages - clear-persistent-data, current message: exec-command"
    );

    assert_eq!(first.await.unwrap(), None);

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_capture_while_executing() {
    let mut recording = connected().await;
    recording.puppeteer.set_transmit_events(true).await.unwrap();

    recording.puppeteer.exec_command(Command::click("#submit")).await.unwrap();
    assert!(next_captured(&mut recording.events).await.is_none());

    // the same click made by the user is captured
    let submit = recording.document.find_by_id("submit").unwrap();
    recording.document.emit(DomEvent::Click { target: submit });

    let event = next_captured(&mut recording.events).await.expect("user click should be captured");
    assert_eq!(event.event_type, CapturedEventType::Click);
    assert_eq!(event.selector.as_deref(), Some("#submit"));
    assert_eq!(event.target.tag_name, "BUTTON");

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exec_function_returns_page_result() {
    let recording = connected().await;

    let source = "function (a, b) { return a + b; }";
    recording.document.register_function(source, |args| {
        let sum = args.iter().filter_map(Jsonf::as_f64).sum::<f64>();
        Ok(Jsonf::from(serde_json::json!(sum)))
    });

    let function = JsFunction::parse(source).unwrap();
    let result = recording
        .puppeteer
        .exec_function(
            function,
            vec![Jsonf::from(serde_json::json!(2)), Jsonf::from(serde_json::json!(3))],
        )
        .await
        .unwrap();
    assert_eq!(result.and_then(|r| r.as_f64()), Some(5.0));

    recording.puppeteer.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_selector_became_visible() {
    let mut recording = connected().await;
    recording
        .puppeteer
        .set_selector_became_visible_selectors(vec![".toast".to_string()])
        .await
        .unwrap();

    let toast = recording.document.query_selector_all(".toast").unwrap()[0];
    recording.document.set_visible(toast, true).unwrap();

    let wait = async {
        loop {
            let received = recording.events.recv().await;
            if let Ok(PuppeteerEvent::SelectorBecameVisible { selector }) = received {
                return selector;
            }
        }
    };
    let selector = tokio::time::timeout(Duration::from_secs(1), wait).await.unwrap();
    assert_eq!(selector, ".toast");

    recording.puppeteer.stop().await;
}
