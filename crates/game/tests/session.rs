use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tilenet::net::{self, Connection, FrameReader, LEVEL_CHUNK_LEN, PlayerJoin};
use tilenet::{
    FrameControl, GameModeKind, HostSession, LevelBlob, LevelStatus, LevelType, Message,
    NetError, PlayerMessage, PlayerProfile, PlayerTemp, Session, SessionConfig, Timings,
    WaitStage,
};

struct Clock {
    start: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn ticks(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

fn test_timings() -> Timings {
    Timings {
        frame: 1,
        server_send: 20,
        server_check: 5,
        client_send: 10,
        client_check: 5,
        timeout: 3000,
    }
}

fn host_config() -> SessionConfig {
    SessionConfig {
        port: 0,
        max_clients: 4,
        mode: GameModeKind::Coop,
        player: None,
        timings: test_timings(),
        ..SessionConfig::default()
    }
}

fn client_config(port: u16, dir: &Path, name: &str) -> SessionConfig {
    SessionConfig {
        port,
        player: Some(PlayerProfile {
            name: name.to_string(),
            colors: [1, 2, 3, 4],
        }),
        staging_path: dir.join(format!("{}.tmp", name)),
        timings: test_timings(),
        ..SessionConfig::default()
    }
}

fn level(bytes: usize) -> LevelBlob {
    let data = (0..bytes).map(|i| (i % 251) as u8).collect();
    LevelBlob::from_bytes("LEVEL1.000", data).unwrap()
}

fn start_host(config: SessionConfig, bytes: usize) -> (HostSession, u16) {
    let host = HostSession::with_level(config, Some(level(bytes))).unwrap();
    let port = host.local_addr().unwrap().port();
    (host, port)
}

fn join_client(host: &mut HostSession, clock: &Clock, config: SessionConfig) -> Session {
    let mut driver = |_: WaitStage| {
        host.step(clock.ticks()).unwrap();
        thread::sleep(Duration::from_millis(1));
        FrameControl::Continue(clock.ticks())
    };
    Session::join(config, "127.0.0.1", &mut driver).unwrap()
}

fn connect_raw(host: &mut HostSession, clock: &Clock, port: u16) -> Connection {
    let mut driver = |_: WaitStage| {
        host.step(clock.ticks()).unwrap();
        thread::sleep(Duration::from_millis(1));
        FrameControl::Continue(clock.ticks())
    };
    net::join("127.0.0.1", port, 3000, &mut driver).unwrap()
}

/// Steps the host and reads the raw connection until `done` accepts a
/// message or the timeout passes. Returns everything read.
fn read_raw_until(
    host: &mut HostSession,
    connection: &mut Connection,
    reader: &mut FrameReader,
    clock: &Clock,
    timeout_ms: u64,
    mut done: impl FnMut(&Message) -> bool,
) -> Vec<Message> {
    let start = Instant::now();
    let mut messages = Vec::new();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        host.step(clock.ticks()).unwrap();
        while let Some(frame) = reader.poll(connection).unwrap() {
            let message = Message::decode(&frame).unwrap();
            let finished = done(&message);
            messages.push(message);
            if finished {
                return messages;
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    messages
}

fn pump(host: &mut HostSession, clients: &mut [&mut Session], clock: &Clock, ms: u64) {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(ms) {
        let ticks = clock.ticks();
        host.step(ticks).unwrap();
        for client in clients.iter_mut() {
            client.step(ticks).unwrap();
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Reads every raw peer for `ms` while stepping the host.
fn read_peers(
    host: &mut HostSession,
    peers: &mut [(Connection, FrameReader)],
    clock: &Clock,
    ms: u64,
) -> Vec<Vec<Message>> {
    let mut seen = vec![Vec::new(); peers.len()];
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(ms) {
        host.step(clock.ticks()).unwrap();
        for ((connection, reader), messages) in peers.iter_mut().zip(seen.iter_mut()) {
            while let Some(frame) = reader.poll(connection).unwrap() {
                messages.push(Message::decode(&frame).unwrap());
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    seen
}

fn checkpoints(messages: &[Message]) -> Vec<(u16, u16)> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Checkpoint { x, y } => Some((*x, *y)),
            _ => None,
        })
        .collect()
}

fn client_id(session: &Session) -> u8 {
    match session {
        Session::Client(client) => client.client_id(),
        other => panic!("not a client session: {:?}", other),
    }
}

fn is_terminal_chunk(message: &Message) -> bool {
    matches!(message, Message::LevelChunk { data, .. } if data.is_empty())
}

#[test]
fn test_first_client_on_dedicated_host() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 600);

    let client = join_client(&mut host, &clock, client_config(port, dir.path(), "jazz"));

    assert_eq!(client_id(&client), 0);
    assert_eq!(client.local_index(), Some(0));
    assert_eq!(client.local_player().unwrap().name, "jazz");
    assert_eq!(client.mode().kind(), GameModeKind::Coop);

    assert_eq!(host.connected_count(), 1);
    let slots = host.slot_infos();
    assert_eq!(slots[0].player, Some(0));
    assert!(slots[0].stats.messages_received >= 1);
}

#[test]
fn test_level_streams_in_chunks() {
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 600);

    let mut connection = connect_raw(&mut host, &clock, port);
    let mut reader = FrameReader::new();
    let messages = read_raw_until(
        &mut host,
        &mut connection,
        &mut reader,
        &clock,
        2000,
        is_terminal_chunk,
    );

    assert!(matches!(messages.first(), Some(Message::Props(props)) if props.client_id == 0));

    let transfer: Vec<&Message> = messages
        .iter()
        .filter(|m| matches!(m, Message::LevelType(_) | Message::LevelChunk { .. }))
        .collect();
    assert_eq!(transfer.len(), 5);
    assert_eq!(transfer[0], &Message::LevelType(LevelType::Level));

    let chunks: Vec<(u16, usize)> = transfer[1..]
        .iter()
        .map(|m| match m {
            Message::LevelChunk { offset, data } => (*offset, data.len()),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(
        chunks,
        vec![(0, LEVEL_CHUNK_LEN), (251, LEVEL_CHUNK_LEN), (502, 98), (600, 0)]
    );
}

#[test]
fn test_level_transfer_is_complete() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 1000);

    let mut client = join_client(&mut host, &clock, client_config(port, dir.path(), "lori"));

    match client.set_level(None).unwrap() {
        LevelStatus::Ready { path, level_type } => {
            assert_eq!(level_type, LevelType::Level);
            assert_eq!(fs::read(path).unwrap(), level(1000).data());
        }
        other => panic!("unexpected level status {:?}", other),
    }
    // Clients follow the host; a requested file name has no effect
    assert_eq!(client.set_level(Some("LEVEL9.000")).unwrap(), LevelStatus::Waiting);
}

#[test]
fn test_checkpoint_relayed_to_other_clients() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut a = join_client(&mut host, &clock, client_config(port, dir.path(), "a"));
    let mut b = join_client(&mut host, &clock, client_config(port, dir.path(), "b"));
    assert_eq!(client_id(&b), 1);

    a.set_checkpoint(12, 7);

    let start = Instant::now();
    while b.checkpoint().x != 12 && start.elapsed() < Duration::from_secs(2) {
        pump(&mut host, &mut [&mut a, &mut b], &clock, 5);
    }

    assert_eq!((b.checkpoint().x, b.checkpoint().y), (12, 7));
    assert_eq!((a.checkpoint().x, a.checkpoint().y), (12, 7));
    assert_eq!(host.slot_infos()[0].player, Some(0));

    let mut session = Session::Host(host);
    assert_eq!((session.checkpoint().x, session.checkpoint().y), (12, 7));
    session.close();
}

#[test]
fn test_checkpoint_sent_once_and_not_echoed() {
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut peers = Vec::new();
    for _ in 0..2 {
        let mut connection = connect_raw(&mut host, &clock, port);
        let mut reader = FrameReader::new();
        read_raw_until(&mut host, &mut connection, &mut reader, &clock, 2000, is_terminal_chunk);
        peers.push((connection, reader));
    }
    assert_eq!(host.connected_count(), 2);

    host.set_checkpoint(12, 7);
    host.set_checkpoint(12, 7);
    let seen = read_peers(&mut host, &mut peers, &clock, 100);
    assert_eq!(checkpoints(&seen[0]), vec![(12, 7)]);
    assert_eq!(checkpoints(&seen[1]), vec![(12, 7)]);

    let moved = Message::Checkpoint { x: 3, y: 4 };
    peers[0].0.send(&moved.encode()).unwrap();
    let seen = read_peers(&mut host, &mut peers, &clock, 200);
    assert!(checkpoints(&seen[0]).is_empty());
    assert_eq!(checkpoints(&seen[1]), vec![(3, 4)]);

    let session = Session::Host(host);
    assert_eq!((session.checkpoint().x, session.checkpoint().y), (3, 4));
}

#[test]
fn test_level_switch_mid_transfer_restarts_download() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut client = join_client(&mut host, &clock, client_config(port, dir.path(), "devan"));
    assert!(matches!(client.set_level(None).unwrap(), LevelStatus::Ready { .. }));

    let long = LevelBlob::from_bytes("LEVEL2.000", vec![7; 1000]).unwrap();
    host.set_level_data(Some(long));

    // Stop once more than the replacement's length of the old level is staged
    let start = Instant::now();
    loop {
        host.step(clock.ticks()).unwrap();
        thread::sleep(Duration::from_millis(1));
        client.step(clock.ticks()).unwrap();
        match client.set_level(None).unwrap() {
            LevelStatus::Downloading { bytes } if bytes > 300 => break,
            LevelStatus::Waiting | LevelStatus::Downloading { .. } => {}
            other => panic!("first level should still be in flight: {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(2), "download never started");
    }

    let short = LevelBlob::from_bytes("BONUSMAP.002", vec![9; 300]).unwrap();
    host.set_level_data(Some(short));

    let mut status = LevelStatus::Waiting;
    let start = Instant::now();
    while !matches!(status, LevelStatus::Ready { .. }) && start.elapsed() < Duration::from_secs(2) {
        pump(&mut host, &mut [&mut client], &clock, 2);
        status = client.set_level(None).unwrap();
    }

    match &status {
        LevelStatus::Ready { path, level_type } => {
            assert_eq!(*level_type, LevelType::Bonus);
            assert_eq!(fs::read(path).unwrap(), vec![9; 300]);
        }
        other => panic!("replacement level never arrived: {:?}", other),
    }
}

#[test]
fn test_player_state_not_echoed_to_owner() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut raw = connect_raw(&mut host, &clock, port);
    let mut reader = FrameReader::new();
    let greeting = read_raw_until(&mut host, &mut raw, &mut reader, &clock, 2000, is_terminal_chunk);
    let raw_id = match greeting.first() {
        Some(Message::Props(props)) => props.client_id,
        other => panic!("expected props, got {:?}", other),
    };

    let join = Message::PlayerJoin(PlayerJoin {
        client_id: raw_id,
        player: 0,
        team: 0,
        colors: [5, 5, 5, 5],
        name: "raw".into(),
    });
    raw.send(&join.encode()).unwrap();
    let acks = read_raw_until(&mut host, &mut raw, &mut reader, &clock, 2000, |m| {
        matches!(m, Message::PlayerJoin(join) if join.client_id == raw_id)
    });
    let raw_index = match acks.last() {
        Some(Message::PlayerJoin(join)) => join.player,
        other => panic!("expected join ack, got {:?}", other),
    };

    let mut b = join_client(&mut host, &clock, client_config(port, dir.path(), "b"));
    let b_index = b.local_index().unwrap() as u8;
    assert_ne!(b_index, raw_index);

    let temp = PlayerTemp {
        x: 12345,
        ..PlayerTemp::default()
    };
    // Player byte is rewritten by the host to the sender's own index
    let update = Message::Player {
        player: 31,
        message: PlayerMessage::Temp(temp),
    };
    raw.send(&update.encode()).unwrap();

    let mut seen = Vec::new();
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(200) {
        host.step(clock.ticks()).unwrap();
        b.step(clock.ticks()).unwrap();
        while let Some(frame) = reader.poll(&mut raw).unwrap() {
            seen.push(Message::decode(&frame).unwrap());
        }
        thread::sleep(Duration::from_millis(1));
    }

    let b_view = b.roster().get(raw_index as usize).unwrap();
    assert_eq!(b_view.temp.x, 12345);

    let addressed: Vec<u8> = seen.iter().filter_map(Message::player_index).collect();
    assert!(addressed.contains(&b_index));
    assert!(!addressed.contains(&raw_index));
}

#[test]
fn test_disconnect_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut client = join_client(&mut host, &clock, client_config(port, dir.path(), "spaz"));
    drop(host);
    thread::sleep(Duration::from_millis(20));

    let mut errors = 0;
    for _ in 0..50 {
        match client.step(clock.ticks()) {
            Ok(()) => {}
            Err(NetError::Disconnected) => errors += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(errors, 1);
    match &client {
        Session::Client(session) => assert!(session.is_closed()),
        other => panic!("not a client session: {:?}", other),
    }
}

#[test]
fn test_roster_stays_dense_when_client_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let config = SessionConfig {
        player: Some(PlayerProfile {
            name: "host".into(),
            colors: [0; 4],
        }),
        ..host_config()
    };
    let (mut host, port) = start_host(config, 300);

    let a = join_client(&mut host, &clock, client_config(port, dir.path(), "a"));
    let mut b = join_client(&mut host, &clock, client_config(port, dir.path(), "b"));
    assert_eq!(a.local_index(), Some(1));
    assert_eq!(b.local_index(), Some(2));

    drop(a);

    let start = Instant::now();
    while b.roster().len() != 2 && start.elapsed() < Duration::from_secs(2) {
        pump(&mut host, &mut [&mut b], &clock, 5);
    }

    let names: Vec<&str> = b.roster().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["host", "b"]);
    assert_eq!(b.local_index(), Some(1));
    assert_eq!(b.local_player().unwrap().name, "b");

    let owned: Vec<usize> = host.slot_infos().iter().filter_map(|s| s.player).collect();
    assert_eq!(owned, vec![1]);
}

#[test]
fn test_full_roster_rejects_join() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let config = SessionConfig {
        max_players: 1,
        ..host_config()
    };
    let (mut host, port) = start_host(config, 300);

    let _first = join_client(&mut host, &clock, client_config(port, dir.path(), "first"));

    let mut driver = |_: WaitStage| {
        host.step(clock.ticks()).unwrap();
        thread::sleep(Duration::from_millis(1));
        FrameControl::Continue(clock.ticks())
    };
    let result = Session::join(client_config(port, dir.path(), "second"), "127.0.0.1", &mut driver);
    assert!(matches!(result, Err(NetError::Disconnected)));
}

#[test]
fn test_next_level_is_streamed_to_joined_clients() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut client = join_client(&mut host, &clock, client_config(port, dir.path(), "jazz"));
    assert!(matches!(client.set_level(None).unwrap(), LevelStatus::Ready { .. }));

    let bonus = LevelBlob::from_bytes("BONUSMAP.001", vec![42; 700]).unwrap();
    host.set_level_data(Some(bonus));

    let mut status = LevelStatus::Waiting;
    let start = Instant::now();
    while !matches!(status, LevelStatus::Ready { .. }) && start.elapsed() < Duration::from_secs(2) {
        pump(&mut host, &mut [&mut client], &clock, 2);
        status = client.set_level(None).unwrap();
    }

    match &status {
        LevelStatus::Ready { path, level_type } => {
            assert_eq!(*level_type, LevelType::Bonus);
            assert_eq!(fs::read(path).unwrap(), vec![42; 700]);
        }
        other => panic!("level never arrived: {:?}", other),
    }

    host.set_level_data(None);
    let start = Instant::now();
    while status != LevelStatus::Ended && start.elapsed() < Duration::from_secs(2) {
        pump(&mut host, &mut [&mut client], &clock, 2);
        status = client.set_level(None).unwrap();
    }
    assert_eq!(status, LevelStatus::Ended);
}

#[test]
fn test_cancelled_join_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::new();
    let (mut host, port) = start_host(host_config(), 300);

    let mut frames = 0;
    let mut driver = |_: WaitStage| {
        host.step(clock.ticks()).unwrap();
        thread::sleep(Duration::from_millis(1));
        frames += 1;
        if frames > 3 {
            FrameControl::Cancel
        } else {
            FrameControl::Continue(clock.ticks())
        }
    };
    let result = Session::join(client_config(port, dir.path(), "x"), "127.0.0.1", &mut driver);

    match result {
        Err(e) => {
            assert!(e.is_user_abort());
            assert_eq!(e.code(), -2);
        }
        Ok(_) => panic!("join should have been cancelled"),
    }
}
