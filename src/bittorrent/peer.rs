use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const PEER_SIZE: usize = 6;

type PeerId = u32;

/// Peer定义
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    // 在tracker返回列表中的位置，只用于日志
    pub id: PeerId,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn new(id: PeerId, ip: Ipv4Addr, port: u16) -> Peer {
        Peer { id, ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}:{}", self.id, self.ip, self.port)
    }
}

/// 构建所有的Peer的信息
/// 总共6bytes
/// 前4byte为ip地址，后两个字节为端口
pub fn build_peers(tracker_peers: &[u8]) -> Result<Vec<Peer>> {
    // 检查返回数据的合法性
    if tracker_peers.len() % PEER_SIZE != 0 {
        return Err(anyhow!("received invalid peers from tracker"));
    }

    tracker_peers
        .chunks(PEER_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = Cursor::new(&chunk[4..6]).read_u16::<BigEndian>()?;
            Ok(Peer::new(i as u32, ip, port))
        })
        .collect()
}
