//! Loopback RESP server shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use respool::codec::{read_reply, write_reply};
use respool::{ConnectionKey, Reply};

type Store = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

/// A tiny in-memory server understanding AUTH, SELECT, PING, SET, GET, DEL
/// and KILL (drops the session without replying).
pub struct TestServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with_password(None)
    }

    pub fn start_with_password(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let store: Store = Arc::default();
        let password = password.map(str::to_string);

        {
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let store = Arc::clone(&store);
                    let password = password.clone();
                    thread::spawn(move || serve(stream, store, password));
                }
            });
        }

        Self { addr, accepted }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new("127.0.0.1", self.addr.port())
    }

    /// Sessions accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, store: Store, password: Option<String>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut authed = password.is_none();

    loop {
        let argv: Vec<Vec<u8>> = match read_reply(&mut reader) {
            Ok(Reply::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_bytes().map(<[u8]>::to_vec))
                .collect(),
            _ => return,
        };
        if argv.is_empty() {
            return;
        }

        let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();
        let reply = match (name.as_str(), &argv[1..]) {
            ("KILL", _) => return,
            ("AUTH", [pw]) => {
                if password.as_deref().map(str::as_bytes) == Some(pw.as_slice()) {
                    authed = true;
                    Reply::status("OK")
                } else {
                    Reply::Error("WRONGPASS invalid username-password pair".into())
                }
            }
            _ if !authed => Reply::Error("NOAUTH Authentication required.".into()),
            ("SELECT", [db]) => match std::str::from_utf8(db).ok().and_then(|s| s.parse::<u32>().ok()) {
                Some(n) if n < 16 => Reply::status("OK"),
                _ => Reply::Error("ERR DB index is out of range".into()),
            },
            ("PING", []) => Reply::status("PONG"),
            ("PING", [payload]) => Reply::bulk(payload.clone()),
            ("SET", [k, v]) => {
                store.lock().unwrap().insert(k.clone(), v.clone());
                Reply::status("OK")
            }
            ("GET", [k]) => match store.lock().unwrap().get(k) {
                Some(v) => Reply::bulk(v.clone()),
                None => Reply::Nil,
            },
            ("DEL", keys) => {
                let mut store = store.lock().unwrap();
                let removed = keys.iter().filter(|k| store.remove(*k).is_some()).count();
                Reply::Integer(removed as i64)
            }
            _ => Reply::Error(format!("ERR unknown command '{name}'")),
        };

        if write_reply(&mut writer, &reply).is_err() {
            return;
        }
    }
}

/// A key whose port has no listener.
pub fn dead_key() -> ConnectionKey {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ConnectionKey::new("127.0.0.1", port)
}
