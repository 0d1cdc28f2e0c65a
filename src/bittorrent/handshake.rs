use crate::bittorrent::error::{PeerError, PeerResult};
use std::io::Read;

const PROTOCOL_ID: &str = "BitTorrent protocol";
const RESERVED_LEN: usize = 8;
pub const HASH_LEN: usize = 20;
pub const PEER_ID_LEN: usize = 20;

/// 握手需要发送的内容
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    // 协议标识符，称为pstr，始终为BitTorrent protocol
    pub pstr: Vec<u8>,
    // 计算出的信息哈希值，用于确定所需的文件
    pub info_hash: [u8; HASH_LEN],
    // 识别自己的Peer ID
    pub peer_id: [u8; PEER_ID_LEN],
}

impl Handshake {
    pub fn new(peer_id: [u8; PEER_ID_LEN], info_hash: [u8; HASH_LEN]) -> Self {
        Handshake {
            pstr: PROTOCOL_ID.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// pstrlen(1) + pstr + reserved(8) + info_hash(20) + peer_id(20)
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized: Vec<u8> =
            Vec::with_capacity(1 + self.pstr.len() + RESERVED_LEN + HASH_LEN + PEER_ID_LEN);
        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; RESERVED_LEN]);
        serialized.extend_from_slice(&self.info_hash);
        serialized.extend_from_slice(&self.peer_id);
        serialized
    }
}

// 反序列化收到的内容
// 收到的内容应该与我们发出的格式相同
pub fn read_handshake<R: Read>(reader: &mut R) -> PeerResult<Handshake> {
    let mut len_buf = [0; 1];
    reader.read_exact(&mut len_buf).map_err(PeerError::from_io)?;
    let pstrlen = len_buf[0] as usize;
    if pstrlen == 0 {
        return Err(PeerError::InvalidHandshake(
            "protocol identifier length cannot be 0".to_string(),
        ));
    }

    let mut buf = vec![0; pstrlen + RESERVED_LEN + HASH_LEN + PEER_ID_LEN];
    reader.read_exact(&mut buf).map_err(PeerError::from_io)?;

    let mut info_hash = [0; HASH_LEN];
    let mut peer_id = [0; PEER_ID_LEN];
    let hash_start = pstrlen + RESERVED_LEN;
    info_hash.copy_from_slice(&buf[hash_start..hash_start + HASH_LEN]);
    peer_id.copy_from_slice(&buf[hash_start + HASH_LEN..]);

    Ok(Handshake {
        pstr: buf[..pstrlen].to_vec(),
        info_hash,
        peer_id,
    })
}

#[cfg(test)]
mod handshake_test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_serialize_layout() {
        let handshake = Handshake::new([2; 20], [1; 20]);
        let buf = handshake.serialize();
        assert_eq!(buf.len(), 68);
        assert_eq!(buf[0], 19);
        assert_eq!(&buf[1..20], b"BitTorrent protocol");
        assert_eq!(&buf[20..28], &[0; 8]);
        assert_eq!(&buf[28..48], &[1; 20]);
        assert_eq!(&buf[48..68], &[2; 20]);
    }

    #[test]
    fn test_read_back() {
        let handshake = Handshake::new([9; 20], [7; 20]);
        let mut cursor = Cursor::new(handshake.serialize());
        assert_eq!(read_handshake(&mut cursor).unwrap(), handshake);
    }

    #[test]
    fn test_zero_pstrlen() {
        let mut cursor = Cursor::new(vec![0; 68]);
        let err = read_handshake(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::InvalidHandshake(_)));
    }

    #[test]
    fn test_truncated_handshake() {
        let mut buf = Handshake::new([9; 20], [7; 20]).serialize();
        buf.truncate(50);
        let err = read_handshake(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, PeerError::ConnectionClosed));
    }
}
