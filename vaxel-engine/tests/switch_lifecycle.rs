use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use vaxel_core::events::{Context, Handler, HandlerFault, Propagation};
use vaxel_engine::{kinds, Controller, ControllerConfig, ControllerEvent};
use vaxel_protocols::openflow::{
    echo_request, hello, Header, MessageType, SwitchFeatures, HEADER_LEN,
};

struct Recorder(Arc<Mutex<Vec<ControllerEvent>>>);

impl Handler<ControllerEvent> for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        self.0.lock().push(event.clone());
        Ok(Propagation::Continue)
    }
}

struct Faulty;

impl Handler<ControllerEvent> for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn handle(
        &mut self,
        _event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        Err(HandlerFault::new("cannot continue"))
    }
}

fn local_controller() -> Controller {
    Controller::new(ControllerConfig {
        openflow_addr: "127.0.0.1:0".to_owned(),
        ..ControllerConfig::default()
    })
    .unwrap()
}

fn read_message(stream: &mut TcpStream) -> Bytes {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).unwrap();
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut message = header.to_vec();
    message.resize(len, 0);
    stream.read_exact(&mut message[HEADER_LEN..]).unwrap();
    Bytes::from(message)
}

fn message_type(message: &Bytes) -> MessageType {
    Header::parse(message).unwrap().message_type().unwrap()
}

fn pump_until(controller: &mut Controller, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        controller.run_once().unwrap();
        if cond() {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn features() -> SwitchFeatures {
    SwitchFeatures {
        datapath_id: 0x42,
        n_buffers: 256,
        n_tables: 1,
        capabilities: 0,
        actions: 0,
        ports: Vec::new(),
    }
}

#[test]
fn switch_handshake_keepalive_and_disconnect() {
    let mut controller = local_controller();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = controller.add_handler(Recorder(seen.clone()));
    for kind in kinds::ALL {
        controller.register(kind, id);
    }

    let mut switch = TcpStream::connect(controller.local_addr().unwrap()).unwrap();
    switch.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    switch.write_all(&hello(1)).unwrap();
    assert_eq!(message_type(&read_message(&mut switch)), MessageType::Hello);
    assert_eq!(
        message_type(&read_message(&mut switch)),
        MessageType::FeaturesRequest
    );

    switch.write_all(&features().encode(2)).unwrap();
    let services = controller.services();
    pump_until(&mut controller, "features reply", || {
        seen.lock()
            .iter()
            .any(|e| matches!(e, ControllerEvent::FeaturesReply(_)))
    });
    assert!(services.switches.get(0x42).is_some());

    switch.write_all(&echo_request(33, b"ping")).unwrap();
    let reply = read_message(&mut switch);
    assert_eq!(message_type(&reply), MessageType::EchoReply);
    assert_eq!(Header::parse(&reply).unwrap().xid, 33);

    drop(switch);
    pump_until(&mut controller, "connection closed", || {
        seen.lock().iter().any(|e| {
            matches!(
                e,
                ControllerEvent::ConnectionClosed {
                    dpid: Some(0x42),
                    ..
                }
            )
        })
    });
    assert!(services.switches.is_empty());
    assert!(seen
        .lock()
        .iter()
        .all(|e| !matches!(e, ControllerEvent::Timer { .. })));
}

#[test]
fn shutdown_runs_cleanup_and_stops_io() {
    let mut controller = local_controller();
    let handle = controller.shutdown_handle();
    handle.shutdown();

    controller.run().unwrap();
    assert!(controller.cleanup_registry().has_run());
    assert!(!controller.is_serving());
}

#[test]
fn handler_fault_is_fatal() {
    let mut controller = local_controller();
    let id = controller.add_handler(Faulty);
    controller.register(kinds::CONNECTION_OPENED, id);

    let _switch = TcpStream::connect(controller.local_addr().unwrap()).unwrap();
    let err = controller.run().unwrap_err();
    assert!(err.to_string().contains("faulty"));
    assert!(controller.cleanup_registry().has_run());
}

#[test]
fn rejects_bad_listen_address() {
    let err = Controller::new(ControllerConfig {
        openflow_addr: "not-an-address".to_owned(),
        ..ControllerConfig::default()
    })
    .err()
    .unwrap();
    assert!(err.to_string().contains("not-an-address"));
}
