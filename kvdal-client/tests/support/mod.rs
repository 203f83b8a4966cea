#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kvdal_client::{ClientConfig, KVClient, LatencySink};
use tracing_subscriber::EnvFilter;

/// Routes client logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-process RESP2 server answering each command through `handler`.
pub struct FakeServer {
    pub addr: String,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeServer {
    /// Every command received so far, across all connections.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().expect("commands").clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn spawn_server<F>(handler: F) -> FakeServer
where
    F: Fn(&[String]) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let commands = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let seen = commands.clone();
    let accepted = connections.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => break,
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            let seen = seen.clone();
            let handler = handler.clone();
            thread::spawn(move || serve(stream, seen, handler));
        }
    });

    FakeServer {
        addr,
        commands,
        connections,
    }
}

fn serve<F>(mut stream: TcpStream, seen: Arc<Mutex<Vec<Vec<String>>>>, handler: Arc<F>)
where
    F: Fn(&[String]) -> Vec<u8>,
{
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    while let Ok(Some(args)) = read_command(&mut reader) {
        seen.lock().expect("commands").push(args.clone());
        let reply = (*handler)(&args[..]);
        if stream.write_all(&reply).and_then(|_| stream.flush()).is_err() {
            break;
        }
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<Vec<String>>> {
    let mut line = Vec::new();
    if read_line(reader, &mut line)?.is_none() {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(|| invalid("eof"))?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(String::from_utf8_lossy(&data).into_owned());
    }
    Ok(Some(args))
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("digit"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

pub fn simple(message: &str) -> Vec<u8> {
    format!("+{}\r\n", message).into_bytes()
}

pub fn error(message: &str) -> Vec<u8> {
    format!("-{}\r\n", message).into_bytes()
}

pub fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

pub fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

pub fn bulk(data: &str) -> Vec<u8> {
    format!("${}\r\n{}\r\n", data.len(), data).into_bytes()
}

/// Array of optional bulk strings; `None` encodes a nil element.
pub fn array(items: &[Option<&str>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        match item {
            Some(data) => out.extend(bulk(data)),
            None => out.extend(nil()),
        }
    }
    out
}

pub fn strings(items: &[&str]) -> Vec<u8> {
    let items: Vec<Option<&str>> = items.iter().copied().map(Some).collect();
    array(&items)
}

/// Sink that keeps every sample for assertions.
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<(f64, Vec<String>)>>,
}

impl RecordingSink {
    pub fn samples(&self) -> Vec<(f64, Vec<String>)> {
        self.samples.lock().expect("samples").clone()
    }

    pub fn tags(&self) -> Vec<Vec<String>> {
        self.samples().into_iter().map(|(_, tags)| tags).collect()
    }
}

impl LatencySink for RecordingSink {
    fn record_latency(&self, millis: f64, tags: &[String]) {
        self.samples.lock().expect("samples").push((millis, tags.to_vec()));
    }
}

pub fn test_config(addr: &str) -> ClientConfig {
    ClientConfig {
        max_active: 4,
        max_idle: 2,
        connect_timeout_ms: Some(1_000),
        read_timeout_ms: Some(2_000),
        write_timeout_ms: Some(1_000),
        ..ClientConfig::new(addr)
    }
}

pub fn client_with_sink(server: &FakeServer) -> (KVClient, Arc<RecordingSink>) {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let client = KVClient::with_sink(test_config(&server.addr), sink.clone()).expect("client");
    (client, sink)
}
