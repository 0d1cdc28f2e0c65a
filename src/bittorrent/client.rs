use crate::bittorrent::bitfield::Bitfield;
use crate::bittorrent::cancel::CancelToken;
use crate::bittorrent::config::Settings;
use crate::bittorrent::error::{PeerError, PeerResult};
use crate::bittorrent::handshake::*;
use crate::bittorrent::message::*;
use crate::bittorrent::peer::Peer;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

/// 连接所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Handshaking,
    AwaitingBitfield,
    Ready,
    Closed,
}

/// 客户端定义，对应和一个peer之间的一条连接
pub struct Client {
    peer: Peer,
    // 本机 peer id
    peer_id: [u8; PEER_ID_LEN],
    // Torrent info hash
    info_hash: [u8; HASH_LEN],
    // 握手时对方声明的id
    remote_id: Option<[u8; PEER_ID_LEN]>,
    conn: TcpStream,
    // 对方拥有的piece
    bitfield: Bitfield,
    // Peer 是否阻塞了我们
    choked: bool,
    state: SessionState,
    settings: Settings,
    cancel: CancelToken,
}

impl Client {
    /// 建立连接，完成握手并读取bitfield，成功后处于 `Ready` 状态
    pub fn connect(
        peer: Peer,
        peer_id: [u8; PEER_ID_LEN],
        info_hash: [u8; HASH_LEN],
        settings: Settings,
        cancel: CancelToken,
    ) -> PeerResult<Client> {
        if cancel.is_cancelled() {
            return Err(PeerError::Cancelled);
        }
        debug!("Connecting to peer {}", peer);
        let conn = TcpStream::connect_timeout(&peer.socket_addr(), settings.connect_timeout)
            .map_err(PeerError::from_io)?;
        info!("Connected to peer {}", peer);

        let mut client = Client {
            peer,
            peer_id,
            info_hash,
            remote_id: None,
            conn,
            bitfield: Bitfield::default(),
            choked: true,
            state: SessionState::Connecting,
            settings,
            cancel,
        };

        client.transition(SessionState::Handshaking);
        client.handshake_with_peer()?;

        client.transition(SessionState::AwaitingBitfield);
        client.read_bitfield()?;

        client.transition(SessionState::Ready);
        // 本机发送unchoke消息代表自己准备好了
        client.send(&Message::Unchoke)?;
        // 发送 Interested 消息，代表自己要开始下载文件了
        client.send(&Message::Interested)?;
        Ok(client)
    }

    fn transition(&mut self, state: SessionState) {
        debug!("Peer {}: {:?} -> {:?}", self.peer, self.state, state);
        self.state = state;
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remote_id(&self) -> Option<&[u8; PEER_ID_LEN]> {
        self.remote_id.as_ref()
    }

    // 返回客户端是否被阻塞
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has_piece(index)
    }

    /// 完成握手，整个过程受 `handshake_timeout` 限制
    fn handshake_with_peer(&mut self) -> PeerResult<()> {
        let deadline = Instant::now() + self.settings.handshake_timeout;
        let handshake = Handshake::new(self.peer_id, self.info_hash);
        self.write_all(&handshake.serialize(), deadline)?;

        let reply = read_handshake(&mut self.stream(deadline));
        let reply = self.check_cancel(reply)?;

        //校验两端的文件hash值是否一样
        if reply.info_hash != self.info_hash {
            warn!("Peer {} replied with info hash {}", self.peer, hex::encode(reply.info_hash));
            return Err(PeerError::InfoHashMismatch);
        }
        self.remote_id = Some(reply.peer_id);
        info!("Completed handshake with peer {}", self.peer);
        Ok(())
    }

    /// 握手之后的第一条消息必须是bitfield
    fn read_bitfield(&mut self) -> PeerResult<()> {
        let deadline = Instant::now() + self.settings.bitfield_timeout;
        match self.read_message(deadline)? {
            Some(Message::Bitfield(bits)) => {
                info!("Receive MESSAGE_BITFIELD from peer {}", self.peer);
                self.bitfield = Bitfield::new(bits);
                debug!("Peer {} has {}", self.peer, self.bitfield);
                Ok(())
            }
            Some(other) => Err(PeerError::UnexpectedMessage {
                expected: "MESSAGE_BITFIELD",
                got: other.name().to_string(),
            }),
            None => Err(PeerError::UnexpectedMessage {
                expected: "MESSAGE_BITFIELD",
                got: "KEEP_ALIVE".to_string(),
            }),
        }
    }

    /// 截止时间对这次读写的每一次系统调用都有效
    fn stream(&self, deadline: Instant) -> DeadlineStream<'_> {
        DeadlineStream {
            conn: &self.conn,
            deadline,
            poll_interval: self.settings.poll_interval,
            cancel: &self.cancel,
        }
    }

    // 取消之后中断的读写都报告为 Cancelled
    fn check_cancel<T>(&self, result: PeerResult<T>) -> PeerResult<T> {
        result.map_err(|e| {
            if self.cancel.is_cancelled() {
                PeerError::Cancelled
            } else {
                e
            }
        })
    }

    /// 读取一条消息，keep-alive 返回 `None`
    pub fn read_message(&mut self, deadline: Instant) -> PeerResult<Option<Message>> {
        let message = read_message(&mut self.stream(deadline));
        let message = self.check_cancel(message)?;
        if message.is_none() {
            debug!("Receive KEEP_ALIVE from peer {}", self.peer);
        }
        Ok(message)
    }

    fn write_all(&mut self, buf: &[u8], deadline: Instant) -> PeerResult<()> {
        let written = self.stream(deadline).write_all(buf).map_err(PeerError::from_io);
        self.check_cancel(written)
    }

    pub fn send(&mut self, message: &Message) -> PeerResult<()> {
        if let Message::Request { .. } = message {
            if self.choked {
                return Err(PeerError::Choked);
            }
        }
        let deadline = Instant::now() + self.settings.piece_timeout;
        self.write_all(&message.serialize()?, deadline)?;
        debug!("Send {} to peer {}", message.name(), self.peer);
        Ok(())
    }

    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> PeerResult<()> {
        debug!(
            "Send MESSAGE_REQUEST for piece {} [{}:{}] to peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.send(&Message::Request {
            index,
            begin,
            length,
        })
    }

    /// 通知已经下载了这个piece
    pub fn send_have(&mut self, index: u32) -> PeerResult<()> {
        self.send(&Message::Have(index))
    }

    /// Read CHOKE message from remote peer.
    pub fn read_choke(&mut self) {
        info!("Receive MESSAGE_CHOKE from peer {}", self.peer);
        self.choked = true
    }

    pub fn read_unchoke(&mut self) {
        info!("Receive MESSAGE_UNCHOKE from peer {}", self.peer);
        self.choked = false
    }

    pub fn read_have(&mut self, index: u32) {
        debug!("Receive MESSAGE_HAVE {} from peer {}", index, self.peer);
        self.bitfield.set_piece(index);
    }

    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            let _ = self.conn.shutdown(Shutdown::Both);
            self.transition(SessionState::Closed);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// 对方一个字节一个字节地发送也不能让读写超过截止时间：
/// 每次系统调用之前按剩余时间重新设置socket超时，超时片段不超过 `poll_interval`
struct DeadlineStream<'a> {
    conn: &'a TcpStream,
    deadline: Instant,
    poll_interval: Duration,
    cancel: &'a CancelToken,
}

impl DeadlineStream<'_> {
    fn next_slice(&self) -> io::Result<Duration> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "download cancelled"));
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"));
        }
        Ok(remaining.min(self.poll_interval))
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut conn = self.conn;
        loop {
            conn.set_read_timeout(Some(self.next_slice()?))?;
            match conn.read(buf) {
                Err(e) if is_timeout(&e) => continue,
                result => return result,
            }
        }
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut conn = self.conn;
        loop {
            conn.set_write_timeout(Some(self.next_slice()?))?;
            match conn.write(buf) {
                Err(e) if is_timeout(&e) => continue,
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut conn = self.conn;
        conn.flush()
    }
}

fn is_timeout(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
}
