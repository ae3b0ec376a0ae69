//! Behavioural tests for command submission and result delivery.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use assetlib_protocol::{Message, Receiver, Status};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use super::support::{RecordingReceiver, TestClient, command, start_server};
use crate::server::ServerHandle;

struct DispatchWorld {
    receiver: Option<Arc<RecordingReceiver>>,
    server: Option<ServerHandle>,
    clients: Vec<TestClient>,
    replies: Vec<Message>,
}

impl DispatchWorld {
    const fn new() -> Self {
        Self {
            receiver: None,
            server: None,
            clients: Vec::new(),
            replies: Vec::new(),
        }
    }

    fn start(&mut self, receiver: Option<RecordingReceiver>) {
        let receiver = receiver.map(Arc::new);
        let attached = receiver
            .clone()
            .map(|receiver| receiver as Arc<dyn Receiver>);
        self.server = Some(start_server(attached));
        self.receiver = receiver;
    }

    fn server(&self) -> &ServerHandle {
        self.server.as_ref().expect("server started")
    }

    fn client(&self, index: usize) -> &TestClient {
        let position = index.checked_sub(1).expect("clients are numbered from 1");
        self.clients.get(position).expect("client exists")
    }

    fn receiver(&self) -> &RecordingReceiver {
        self.receiver.as_deref().expect("server has a recording receiver")
    }

    fn submit(&mut self, index: usize, message: Message) {
        let reply = self.client(index).submit(self.server(), message);
        self.replies.push(reply);
    }

    fn last_reply(&self) -> &Message {
        self.replies.last().expect("a submission was made")
    }
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown();
            drop(server.join());
        }
    }
}

fn parse_request(request: &str) -> Message {
    let mut words = request.split_whitespace();
    let name = words.next().expect("request names a command");
    let args: Vec<&str> = words.collect();
    command(name, &args)
}

fn blocking(message: Message) -> Message {
    message.with_kwargs([("blocking".to_owned(), Value::Bool(true))].into_iter().collect())
}

#[fixture]
fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::new())
}

#[given("a server with a recording receiver")]
fn given_recording_server(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().start(Some(RecordingReceiver::default()));
}

#[given("a server with a slow recording receiver")]
fn given_slow_server(world: &RefCell<DispatchWorld>) {
    world
        .borrow_mut()
        .start(Some(RecordingReceiver::slow(Duration::from_millis(50))));
}

#[given("a server without a receiver")]
fn given_detached_server(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().start(None);
}

#[given("{count} registered clients")]
fn given_registered_clients(world: &RefCell<DispatchWorld>, count: usize) {
    let mut world = world.borrow_mut();
    for _ in 0..count {
        let client = TestClient::bind();
        let reply = client.connect(world.server());
        assert!(reply.is_ok(), "registration failed: {}", reply.failure_text());
        world.clients.push(client);
    }
}

#[given("a registered client")]
fn given_registered_client(world: &RefCell<DispatchWorld>) {
    given_registered_clients(world, 1);
}

#[given("a client that never registered")]
fn given_unregistered_client(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().clients.push(TestClient::bind());
}

#[when("client {index} submits \"{request}\"")]
fn when_client_submits(world: &RefCell<DispatchWorld>, index: usize, request: String) {
    world.borrow_mut().submit(index, parse_request(&request));
}

#[when("client {index} submits \"{request}\" as blocking")]
fn when_client_submits_blocking(world: &RefCell<DispatchWorld>, index: usize, request: String) {
    world.borrow_mut().submit(index, blocking(parse_request(&request)));
}

#[when("the server queue drains")]
fn when_queue_drains(world: &RefCell<DispatchWorld>) {
    world.borrow().server().drain().expect("queue drains");
}

#[then("the submission is acknowledged with \"{info}\"")]
fn then_acknowledged(world: &RefCell<DispatchWorld>, info: String) {
    let world = world.borrow();
    let reply = world.last_reply();
    assert_eq!(reply.status, Some(Status::Ok), "{}", reply.failure_text());
    assert_eq!(reply.info.as_deref(), Some(info.as_str()));
}

#[then("the submission fails with \"{info}\"")]
fn then_submission_fails(world: &RefCell<DispatchWorld>, info: String) {
    let world = world.borrow();
    let reply = world.last_reply();
    assert_eq!(reply.status, Some(Status::Fail));
    assert_eq!(reply.info.as_deref(), Some(info.as_str()));
}

#[then("the submission tells client {index} to reconnect")]
fn then_told_to_reconnect(world: &RefCell<DispatchWorld>, index: usize) {
    let world = world.borrow();
    let expected = format!("{} not registered, try reconnecting..", world.client(index).id());
    let reply = world.last_reply();
    assert_eq!(reply.status, Some(Status::Fail));
    assert_eq!(reply.info, Some(expected));
}

#[then("client {index} receives {count} results")]
fn then_client_receives(world: &RefCell<DispatchWorld>, index: usize, count: usize) {
    let world = world.borrow();
    let received = world.client(index).wait_for(count);
    assert_eq!(received.len(), count);
}

#[then("client {index} has already received {count} results")]
fn then_client_already_received(world: &RefCell<DispatchWorld>, index: usize, count: usize) {
    let world = world.borrow();
    assert_eq!(world.client(index).received().len(), count);
}

#[then("result {position} for client {index} imported \"{path}\"")]
fn then_result_imported(
    world: &RefCell<DispatchWorld>,
    position: usize,
    index: usize,
    path: String,
) {
    let world = world.borrow();
    let received = world.client(index).wait_for(position);
    let result = received.get(position - 1).expect("result present");
    assert!(result.is_ok(), "{}", result.failure_text());
    assert_eq!(result.result, Some(json!({ "imported": path })));
}

#[then("result {position} for client {index} failed with \"{info}\"")]
fn then_result_failed(world: &RefCell<DispatchWorld>, position: usize, index: usize, info: String) {
    let world = world.borrow();
    let received = world.client(index).wait_for(position);
    let result = received.get(position - 1).expect("result present");
    assert_eq!(result.status, Some(Status::Fail));
    assert_eq!(result.info.as_deref(), Some(info.as_str()));
}

#[then("result {position} for client {index} is a timestamp")]
fn then_result_timestamp(world: &RefCell<DispatchWorld>, position: usize, index: usize) {
    let world = world.borrow();
    let received = world.client(index).wait_for(position);
    let result = received.get(position - 1).expect("result present");
    let stamp = result
        .result
        .as_ref()
        .and_then(Value::as_str)
        .expect("string result");
    assert!(stamp.contains('T'), "not an RFC 3339 timestamp: {stamp}");
}

#[then("the receiver ran \"{calls}\" in order")]
fn then_receiver_ran(world: &RefCell<DispatchWorld>, calls: String) {
    let world = world.borrow();
    let expected: Vec<&str> = calls.split(", ").collect();
    assert_eq!(world.receiver().calls(), expected);
}

#[then("the receiver was not called")]
fn then_receiver_idle(world: &RefCell<DispatchWorld>) {
    assert!(world.borrow().receiver().calls().is_empty());
}

#[then("no two commands ran at the same time")]
fn then_no_overlap(world: &RefCell<DispatchWorld>) {
    assert!(!world.borrow().receiver().overlapped());
}

#[then("nothing is pending on the server")]
fn then_nothing_pending(world: &RefCell<DispatchWorld>) {
    assert_eq!(world.borrow().server().pending(), 0);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "An import is acknowledged and its result pushed back"
)]
fn import_round_trip(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "Unknown commands are rejected without queueing"
)]
fn unknown_command(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "Unregistered clients are told to reconnect"
)]
fn unregistered_client(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "Commands needing a host fail without a receiver"
)]
fn no_receiver(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "A queued submission is acknowledged before it runs"
)]
fn queued_before_running(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "A blocking submission waits for the queue to drain"
)]
fn blocking_drain(world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/command_dispatch.feature",
    name = "Commands from several clients run one at a time in arrival order"
)]
fn ordering_across_clients(world: RefCell<DispatchWorld>) {
    drop(world);
}
