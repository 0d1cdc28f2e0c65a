use crate::bittorrent::error::{PeerError, PeerResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

type MessageId = u8;

pub const MESSAGE_CHOKE: MessageId = 0; // 阻塞消息接收者
pub const MESSAGE_UNCHOKE: MessageId = 1; // 解除阻塞消息接收者
pub const MESSAGE_INTERESTED: MessageId = 2; // 表示有兴趣接收数据
pub const MESSAGE_NOT_INTERESTED: MessageId = 3; // 表示没有有兴趣接收数据
pub const MESSAGE_HAVE: MessageId = 4; // 提醒消息接收者，发送者已经下载了一个块
pub const MESSAGE_BITFIELD: MessageId = 5; // 对发送者已经下载的片段进行编码
pub const MESSAGE_REQUEST: MessageId = 6; // 向消息接收者请求一个块
pub const MESSAGE_PIECE: MessageId = 7; // 传送满足请求的数据块
pub const MESSAGE_CANCEL: MessageId = 8; // 取消一个请求

/// 单个消息的最大长度，防止对方声明一个超大的长度
const MAX_FRAME_LEN: u32 = 1 << 21;

/// 握手之后双方交换的消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::Choke => MESSAGE_CHOKE,
            Message::Unchoke => MESSAGE_UNCHOKE,
            Message::Interested => MESSAGE_INTERESTED,
            Message::NotInterested => MESSAGE_NOT_INTERESTED,
            Message::Have(_) => MESSAGE_HAVE,
            Message::Bitfield(_) => MESSAGE_BITFIELD,
            Message::Request { .. } => MESSAGE_REQUEST,
            Message::Piece { .. } => MESSAGE_PIECE,
            Message::Cancel { .. } => MESSAGE_CANCEL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Choke => "MESSAGE_CHOKE",
            Message::Unchoke => "MESSAGE_UNCHOKE",
            Message::Interested => "MESSAGE_INTERESTED",
            Message::NotInterested => "MESSAGE_NOT_INTERESTED",
            Message::Have(_) => "MESSAGE_HAVE",
            Message::Bitfield(_) => "MESSAGE_BITFIELD",
            Message::Request { .. } => "MESSAGE_REQUEST",
            Message::Piece { .. } => "MESSAGE_PIECE",
            Message::Cancel { .. } => "MESSAGE_CANCEL",
        }
    }

    fn payload(&self) -> io::Result<Vec<u8>> {
        let mut payload: Vec<u8> = vec![];
        match self {
            Message::Have(index) => payload.write_u32::<BigEndian>(*index)?,
            Message::Bitfield(bits) => payload.extend_from_slice(bits),
            Message::Request {
                index,
                begin,
                length,
            }
            | Message::Cancel {
                index,
                begin,
                length,
            } => {
                payload.write_u32::<BigEndian>(*index)?;
                payload.write_u32::<BigEndian>(*begin)?;
                payload.write_u32::<BigEndian>(*length)?;
            }
            Message::Piece {
                index,
                begin,
                block,
            } => {
                payload.write_u32::<BigEndian>(*index)?;
                payload.write_u32::<BigEndian>(*begin)?;
                payload.extend_from_slice(block);
            }
            _ => {}
        }
        Ok(payload)
    }

    /// 序列化消息: 长度(4) + 类型(1) + payload
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let payload = self.payload()?;
        // 消息长度，1表示的是一个byte，用来表示消息类型
        let message_len = 1 + payload.len();

        let mut serialized: Vec<u8> = Vec::with_capacity(4 + message_len);
        serialized.write_u32::<BigEndian>(message_len as u32)?;
        serialized.push(self.id());
        serialized.extend_from_slice(&payload);
        Ok(serialized)
    }
}

/// 从一个完整的帧(不包括长度前缀)中解析消息，并按类型校验payload
pub fn deserialize_message(message_buf: &[u8]) -> PeerResult<Message> {
    let (&id, payload) = message_buf.split_first().ok_or(PeerError::InvalidPayload {
        kind: "empty frame",
        len: 0,
    })?;

    let message = match id {
        MESSAGE_CHOKE => Message::Choke,
        MESSAGE_UNCHOKE => Message::Unchoke,
        MESSAGE_INTERESTED => Message::Interested,
        MESSAGE_NOT_INTERESTED => Message::NotInterested,
        MESSAGE_HAVE => {
            let mut cursor = expect_len(payload, 4, "MESSAGE_HAVE")?;
            Message::Have(cursor.read_u32::<BigEndian>()?)
        }
        MESSAGE_BITFIELD => Message::Bitfield(payload.to_vec()),
        MESSAGE_REQUEST | MESSAGE_CANCEL => {
            let kind = if id == MESSAGE_REQUEST {
                "MESSAGE_REQUEST"
            } else {
                "MESSAGE_CANCEL"
            };
            let mut cursor = expect_len(payload, 12, kind)?;
            let index = cursor.read_u32::<BigEndian>()?;
            let begin = cursor.read_u32::<BigEndian>()?;
            let length = cursor.read_u32::<BigEndian>()?;
            if id == MESSAGE_REQUEST {
                Message::Request {
                    index,
                    begin,
                    length,
                }
            } else {
                Message::Cancel {
                    index,
                    begin,
                    length,
                }
            }
        }
        MESSAGE_PIECE => {
            if payload.len() < 8 {
                return Err(PeerError::InvalidPayload {
                    kind: "MESSAGE_PIECE",
                    len: payload.len(),
                });
            }
            let mut cursor = Cursor::new(&payload[0..8]);
            let index = cursor.read_u32::<BigEndian>()?;
            let begin = cursor.read_u32::<BigEndian>()?;
            Message::Piece {
                index,
                begin,
                block: payload[8..].to_vec(),
            }
        }
        other => return Err(PeerError::UnknownMessage(other)),
    };
    Ok(message)
}

fn expect_len<'a>(
    payload: &'a [u8],
    len: usize,
    kind: &'static str,
) -> PeerResult<Cursor<&'a [u8]>> {
    if payload.len() != len {
        return Err(PeerError::InvalidPayload {
            kind,
            len: payload.len(),
        });
    }
    Ok(Cursor::new(payload))
}

/// 读取一条消息，长度为0的keep-alive返回 `None`
pub fn read_message<R: Read>(reader: &mut R) -> PeerResult<Option<Message>> {
    let message_len = reader
        .read_u32::<BigEndian>()
        .map_err(PeerError::from_io)?;
    if message_len == 0 {
        return Ok(None);
    }
    if message_len > MAX_FRAME_LEN {
        return Err(PeerError::InvalidPayload {
            kind: "frame",
            len: message_len as usize,
        });
    }

    let mut message_buf: Vec<u8> = vec![0; message_len as usize];
    reader
        .read_exact(&mut message_buf)
        .map_err(PeerError::from_io)?;
    deserialize_message(&message_buf).map(Some)
}
