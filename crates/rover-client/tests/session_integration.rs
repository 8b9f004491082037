//! End-to-end tests of the client against a scripted server.
//!
//! The server side is played by feeding answers into the controller and
//! inspecting what the [`MemoryLink`] recorded; no sockets are involved.

use rover_client::application::bindings::KeyBindings;
use rover_client::application::controller::RoverController;
use rover_client::application::handshake::{
    HandshakeSession, HandshakeState, SessionError, SessionEvent, SessionOptions,
};
use rover_client::application::held_inputs::InputSource;
use rover_client::application::motion_intent::MotionError;
use rover_client::application::wire_link::LinkEvent;
use rover_client::infrastructure::link::MemoryLink;
use rover_client::infrastructure::stream::{ChannelLauncher, StreamRequest};
use rover_core::{DriveFlag, SessionIdentity};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

const HELLO_ACK: &[u8] = br#"{"server_id":"srv","msg":"ack"}"#;
const LIST: &[u8] = br#"{"server_id":"srv","rovers":[{"rover_id":"A","description":"first"},{"rover_id":"B"}]}"#;

fn bind_ack(rover_id: &str) -> Vec<u8> {
    json!({"server_id": "srv", "client_id": "c", "rover_id": rover_id, "msg": "ok"})
        .to_string()
        .into_bytes()
}

struct Harness {
    controller: RoverController,
    link: MemoryLink,
    requests: UnboundedReceiver<StreamRequest>,
}

impl Harness {
    fn new(options: SessionOptions) -> Self {
        let (launcher, requests) = ChannelLauncher::new();
        let session = HandshakeSession::new(SessionIdentity::generate(), options, Box::new(launcher));
        let controller = RoverController::new(session, KeyBindings::default(), 0.5);
        Self {
            controller,
            link: MemoryLink::new(),
            requests,
        }
    }

    fn answer(&mut self, raw: &[u8]) -> Result<Option<SessionEvent>, SessionError> {
        self.controller.on_link_event(LinkEvent::Message(raw.to_vec()))
    }

    fn state(&self) -> HandshakeState {
        self.controller.status().state
    }

    fn commands(&self) -> Vec<String> {
        self.link.sent_commands()
    }

    fn last(&self) -> Value {
        self.link.sent_json().pop().unwrap_or(Value::Null)
    }
}

#[test]
fn test_idle_to_bound_launches_stream_exactly_once() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.controller.start(Box::new(h.link.clone())).unwrap();
    assert_eq!(h.state(), HandshakeState::Idle);

    // Act
    h.link.set_open(true);
    h.controller.on_link_event(LinkEvent::Opened).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    let bound = h.answer(&bind_ack("A")).unwrap();

    // Assert
    assert!(matches!(bound, Some(SessionEvent::Bound(ref rover)) if rover.rover_id == "A"));
    assert_eq!(h.state(), HandshakeState::Bound);
    assert_eq!(h.commands(), vec!["hello", "list", "connect", "set_speed"]);
    let request = h.requests.try_recv().unwrap();
    assert_eq!(request.rover.rover_id, "A");
    assert_eq!(request.identity, h.controller.session().identity());
    assert!(h.requests.try_recv().is_err(), "exactly one launch");
}

#[test]
fn test_every_command_carries_the_session_identity_and_an_increasing_id() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();

    // Act
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();

    // Assert
    let identity = h.controller.session().identity().to_string();
    let sent = h.link.sent_json();
    for frame in &sent {
        assert_eq!(frame["params"]["client_id"], identity.as_str());
    }
    let ids: Vec<u64> = sent.iter().filter_map(|f| f["id"].as_u64()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_list_answer_while_awaiting_hello_does_not_advance() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();

    // Act
    let result = h.answer(LIST);

    // Assert
    assert!(matches!(result, Err(SessionError::UnexpectedAnswer { .. })));
    assert_eq!(h.state(), HandshakeState::AwaitingHello);
    assert_eq!(h.commands(), vec!["hello"]);

    // The real ack still completes the step afterwards.
    h.answer(HELLO_ACK).unwrap();
    assert_eq!(h.state(), HandshakeState::AwaitingList);
}

#[test]
fn test_out_of_range_selection_is_a_no_op() {
    // Arrange
    let mut h = Harness::new(SessionOptions {
        auto_select: false,
        preferred_rover: None,
    });
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    let sent_before = h.link.sent().len();

    // Act
    let negative = h.controller.select_rover(-1);
    let past_end = h.controller.select_rover(99);

    // Assert
    assert!(matches!(negative, Err(SessionError::RoverIndexOutOfRange { index: -1, len: 2 })));
    assert!(matches!(past_end, Err(SessionError::RoverIndexOutOfRange { index: 99, len: 2 })));
    assert_eq!(h.state(), HandshakeState::AwaitingSelection);
    assert_eq!(h.link.sent().len(), sent_before);

    // Act: a valid index still works
    h.controller.select_rover(1).unwrap();
    h.answer(&bind_ack("B")).unwrap();

    // Assert
    assert_eq!(h.controller.status().rover.map(|r| r.rover_id), Some("B".to_string()));
}

#[test]
fn test_preferred_rover_is_auto_selected() {
    let mut h = Harness::new(SessionOptions {
        auto_select: true,
        preferred_rover: Some("B".to_string()),
    });
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    assert_eq!(h.last()["params"]["rover_id"], "B");
}

#[test]
fn test_forward_left_scenario_through_the_controller() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    h.answer(&bind_ack("A")).unwrap();
    h.link.clear_sent();

    // Act
    h.controller.begin(DriveFlag::Forward).unwrap();
    h.controller.begin(DriveFlag::Left).unwrap();
    h.controller.end(DriveFlag::Forward).unwrap();
    h.controller.end(DriveFlag::Left).unwrap();

    // Assert
    let sent: Vec<(Value, Value)> = h
        .link
        .sent_json()
        .into_iter()
        .map(|f| (f["cmd"].clone(), f["params"].clone()))
        .collect();
    assert_eq!(
        sent,
        vec![
            (json!("move"), json!({"direction": ["forward"]})),
            (json!("move"), json!({"direction": ["forward", "left"]})),
            (json!("move"), json!({"direction": ["left"]})),
            (json!("move_stop"), json!({"motors": ["wheels"]})),
        ]
    );
}

#[test]
fn test_steady_state_answers_are_reported_per_command() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    h.answer(&bind_ack("A")).unwrap();
    h.answer(br#"{"msg":"ok"}"#).unwrap(); // set_speed
    h.controller.begin(DriveFlag::Back).unwrap();

    // Act
    let event = h.answer(br#"{"msg":"failed","info":"blocked"}"#).unwrap();

    // Assert
    assert!(matches!(event, Some(SessionEvent::CommandAnswer { .. })));
    assert_eq!(h.state(), HandshakeState::Bound);
}

#[test]
fn test_refused_bind_lets_the_operator_pick_another_rover() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();

    // Act
    let refused = h.answer(br#"{"msg":"failed","info":"blocked"}"#).unwrap();
    h.controller.select_rover(1).unwrap();
    h.answer(&bind_ack("B")).unwrap();

    // Assert
    assert!(matches!(refused, Some(SessionEvent::Refused { .. })));
    assert_eq!(h.state(), HandshakeState::Bound);
    assert_eq!(h.commands(), vec!["hello", "list", "connect", "connect", "set_speed"]);
    assert_eq!(h.requests.try_recv().unwrap().rover.rover_id, "B");
}

#[test]
fn test_unanswered_moves_do_not_disturb_later_answers() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();
    h.answer(LIST).unwrap();
    h.answer(&bind_ack("A")).unwrap();
    h.controller.begin(DriveFlag::Forward).unwrap();

    // Act
    for _ in 0..100 {
        h.controller.refresh().unwrap();
    }

    // Assert
    assert_eq!(h.controller.session().pending().count(), 0);
    assert_eq!(h.state(), HandshakeState::Bound);
    let event = h.answer(br#"{"msg":"ok"}"#).unwrap();
    assert!(matches!(event, Some(SessionEvent::CommandAnswer { .. })));
}

#[test]
fn test_held_keys_before_binding_are_refused_without_state() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();

    // Act
    let result = h.controller.press_key(InputSource::Keyboard, 'w');

    // Assert
    assert!(matches!(
        result,
        Err(MotionError::Session(SessionError::NotBound(HandshakeState::AwaitingHello)))
    ));
    assert!(h.controller.status().direction.is_stop());
    assert_eq!(h.commands(), vec!["hello"]);
}

#[test]
fn test_link_close_ends_the_session() {
    // Arrange
    let mut h = Harness::new(SessionOptions::default());
    h.link.set_open(true);
    h.controller.start(Box::new(h.link.clone())).unwrap();
    h.answer(HELLO_ACK).unwrap();

    // Act
    let closed = h.controller.on_link_event(LinkEvent::Error("reset".to_string())).unwrap();
    let again = h.controller.on_link_event(LinkEvent::Closed).unwrap();

    // Assert
    assert_eq!(closed, Some(SessionEvent::Closed));
    assert_eq!(again, None);
    assert_eq!(h.state(), HandshakeState::Closed);
    assert!(matches!(h.answer(LIST), Err(SessionError::SessionClosed)));
}
