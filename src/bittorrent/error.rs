use std::io;
use thiserror::Error;

/// 与单个peer通信时可能出现的错误
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// 连接、握手或读取超过了截止时间
    #[error("timed out")]
    Timeout,

    #[error("connection closed by peer")]
    ConnectionClosed,

    /// 下载已经结束，worker需要退出
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// 对方回复的info hash与本地的不一致
    #[error("info hash mismatch")]
    InfoHashMismatch,

    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: String },

    /// 被对方阻塞时不允许发送请求
    #[error("cannot request blocks while choked")]
    Choked,

    #[error("unknown message id {0}")]
    UnknownMessage(u8),

    #[error("invalid {kind} payload of length {len}")]
    InvalidPayload { kind: &'static str, len: usize },

    #[error("expected piece {expected}, got {got}")]
    PieceIndexMismatch { expected: u32, got: u32 },

    #[error("block [{begin}:{end}] out of bounds for piece of length {length}")]
    BlockOutOfBounds { begin: u32, end: u64, length: u32 },

    /// 重复的块，或者根本没有请求过的块
    #[error("unrequested block [{begin}:+{length}]")]
    UnrequestedBlock { begin: u32, length: u32 },

    /// 下载完成的piece没有通过SHA-1校验
    #[error("piece {0} failed its integrity check")]
    HashMismatch(u32),
}

impl PeerError {
    /// 除了校验失败之外，其他错误都意味着这个连接不能再用
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PeerError::HashMismatch(_))
    }

    /// 把socket超时统一成 `Timeout`
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => PeerError::Timeout,
            io::ErrorKind::UnexpectedEof => PeerError::ConnectionClosed,
            _ => PeerError::Io(err),
        }
    }
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
