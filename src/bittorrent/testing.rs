//! 测试用的假peer，在本地端口上模拟一个做种的客户端
use crate::bittorrent::config::Settings;
use crate::bittorrent::error::PeerError;
use crate::bittorrent::handshake::{read_handshake, Handshake};
use crate::bittorrent::message::{read_message, Message};
use crate::bittorrent::peer::Peer;

use std::collections::HashSet;
use std::io::Write;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub fn test_settings() -> Settings {
    Settings {
        connect_timeout: Duration::from_secs(1),
        handshake_timeout: Duration::from_millis(500),
        bitfield_timeout: Duration::from_millis(500),
        piece_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        ..Settings::default()
    }
}

/// 假peer对一条消息做出的动作
pub enum Reply {
    Send(Message),
    KeepAlive,
    /// 每隔 `Duration` 发送一个字节
    Drip(Message, Duration),
    /// 等一段时间，期间收到的消息照常记录但不回复
    Pause(Duration),
}

/// 连接上按顺序发生的事情
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Received(Message),
    Sent(Message),
}

type Script = Box<dyn FnMut(&Message) -> Vec<Reply> + Send>;

pub struct FakePeer {
    info_hash: [u8; 20],
    bitfield: Vec<u8>,
    pieces: Vec<Vec<u8>>,
    first_message: Option<Message>,
    corrupt_first: HashSet<u32>,
    silent: bool,
    slow_handshake: Option<Duration>,
    script: Option<Script>,
}

pub struct FakePeerHandle {
    pub peer: Peer,
    events: Arc<Mutex<Vec<Event>>>,
}

/// 从 `data` 中切出请求的块
pub fn piece_block(data: &[u8], index: u32, begin: u32, length: u32) -> Message {
    Message::Piece {
        index,
        begin,
        block: data[begin as usize..(begin + length) as usize].to_vec(),
    }
}

impl FakePeer {
    pub fn new(info_hash: [u8; 20], bitfield: Vec<u8>, pieces: Vec<Vec<u8>>) -> Self {
        FakePeer {
            info_hash,
            bitfield,
            pieces,
            first_message: None,
            corrupt_first: HashSet::new(),
            silent: false,
            slow_handshake: None,
            script: None,
        }
    }

    /// 握手之后发送这条消息而不是bitfield
    pub fn first_message(mut self, message: Message) -> Self {
        self.first_message = Some(message);
        self
    }

    /// 第一次发送这个piece时把数据弄坏
    pub fn corrupt_first(mut self, index: u32) -> Self {
        self.corrupt_first.insert(index);
        self
    }

    /// 读取握手之后不做任何回复
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// 握手回复每隔 `interval` 才发一个字节
    pub fn slow_handshake(mut self, interval: Duration) -> Self {
        self.slow_handshake = Some(interval);
        self
    }

    /// 除了 Interested 之外的消息都交给 `script` 决定怎么回复
    pub fn script<F>(mut self, script: F) -> Self
    where
        F: FnMut(&Message) -> Vec<Reply> + Send + 'static,
    {
        self.script = Some(Box::new(script));
        self
    }

    pub fn spawn(self) -> FakePeerHandle {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let events = Arc::new(Mutex::new(vec![]));
        let log = events.clone();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                self.serve(stream, log);
            }
        });
        FakePeerHandle {
            peer: Peer::new(port as u32, Ipv4Addr::LOCALHOST, port),
            events,
        }
    }

    fn serve(mut self, mut stream: TcpStream, log: Arc<Mutex<Vec<Event>>>) {
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        if read_handshake(&mut stream).is_err() {
            return;
        }
        if self.silent {
            thread::sleep(Duration::from_secs(2));
            return;
        }

        let reply = Handshake::new([0xAA; 20], self.info_hash).serialize();
        let sent = match self.slow_handshake {
            Some(interval) => drip(&mut stream, &reply, interval),
            None => stream.write_all(&reply).is_ok(),
        };
        let first = self
            .first_message
            .take()
            .unwrap_or_else(|| Message::Bitfield(self.bitfield.clone()));
        if !sent || stream.write_all(&first.serialize().unwrap()).is_err() {
            return;
        }

        loop {
            let message = match read_message(&mut stream) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(_) => return,
            };
            log.lock().unwrap().push(Event::Received(message.clone()));

            let replies = if matches!(message, Message::Interested) {
                vec![Reply::Send(Message::Unchoke)]
            } else if let Some(script) = self.script.as_mut() {
                script(&message)
            } else {
                self.default_replies(message)
            };
            for reply in replies {
                if !play(&mut stream, reply, &log) {
                    return;
                }
            }
        }
    }

    fn default_replies(&mut self, message: Message) -> Vec<Reply> {
        match message {
            Message::Request {
                index,
                begin,
                length,
            } => {
                let mut reply = piece_block(&self.pieces[index as usize], index, begin, length);
                if self.corrupt_first.remove(&index) {
                    if let Message::Piece { block, .. } = &mut reply {
                        block[0] ^= 0xff;
                    }
                }
                vec![Reply::Send(reply)]
            }
            _ => vec![],
        }
    }
}

fn drip(stream: &mut TcpStream, bytes: &[u8], interval: Duration) -> bool {
    for byte in bytes {
        thread::sleep(interval);
        if stream.write_all(&[*byte]).is_err() {
            return false;
        }
    }
    true
}

fn play(stream: &mut TcpStream, reply: Reply, log: &Mutex<Vec<Event>>) -> bool {
    match reply {
        Reply::Send(message) => {
            if stream.write_all(&message.serialize().unwrap()).is_err() {
                return false;
            }
            log.lock().unwrap().push(Event::Sent(message));
        }
        Reply::KeepAlive => {
            if stream.write_all(&[0; 4]).is_err() {
                return false;
            }
        }
        Reply::Drip(message, interval) => {
            if !drip(stream, &message.serialize().unwrap(), interval) {
                return false;
            }
            log.lock().unwrap().push(Event::Sent(message));
        }
        Reply::Pause(duration) => {
            let until = Instant::now() + duration;
            loop {
                let remaining = until.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                stream.set_read_timeout(Some(remaining)).unwrap();
                match read_message(&mut *stream) {
                    Ok(Some(message)) => log.lock().unwrap().push(Event::Received(message)),
                    Ok(None) => {}
                    Err(PeerError::Timeout) => break,
                    Err(_) => return false,
                }
            }
            stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        }
    }
    true
}

impl FakePeerHandle {
    /// 连接上发生的所有事情
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// 收到的所有消息
    pub fn received(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Received(message) => Some(message),
                Event::Sent(_) => None,
            })
            .collect()
    }

    /// 最多等两秒，直到至少收到 `count` 条消息
    pub fn wait_for(&self, count: usize) -> Vec<Message> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.received().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        self.received()
    }

    pub fn requested_indices(&self) -> Vec<u32> {
        self.received()
            .iter()
            .filter_map(|message| match message {
                Message::Request { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}
