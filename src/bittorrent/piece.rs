use crate::bittorrent::error::{PeerError, PeerResult};
use crate::bittorrent::handshake::HASH_LEN;
use sha1::{Digest, Sha1};

/// 一个待下载的piece，在任务队列中流转，不会被修改
#[derive(Debug, Clone, PartialEq)]
pub struct PieceWork {
    // Piece 索引
    pub index: u32,
    // Piece 哈希值
    pub hash: [u8; HASH_LEN],
    // Piece 长度
    pub length: u32,
}

/// 下载某个piece时的中间状态，每次尝试都重新创建
#[derive(Debug)]
pub struct PieceProgress {
    pub index: u32,
    // Piece 数据
    pub data: Vec<u8>,
    // 已经请求到的偏移
    pub requested: u32,
    // 下载了的数据大小
    pub downloaded: u32,
    // 发出去但还没有收到回复的请求数
    pub backlog: u32,
    // 还没有收到回复的请求 (begin, length)
    pending: Vec<(u32, u32)>,
}

/// 通过校验的piece
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; HASH_LEN], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }
}

impl PieceProgress {
    pub fn new(work: &PieceWork) -> PieceProgress {
        PieceProgress {
            index: work.index,
            data: vec![0; work.length as usize],
            requested: 0,
            downloaded: 0,
            backlog: 0,
            pending: vec![],
        }
    }

    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.length()
    }

    /// 取出下一个要请求的块 (begin, length)，最后一块按剩余长度截断
    pub fn next_block(&mut self, block_size: u32) -> Option<(u32, u32)> {
        let remaining = self.length() - self.requested;
        if remaining == 0 {
            return None;
        }
        let begin = self.requested;
        let length = block_size.min(remaining);
        self.requested += length;
        self.backlog += 1;
        self.pending.push((begin, length));
        Some((begin, length))
    }

    /// 校验并保存收到的块，返回写入的字节数
    pub fn write_block(&mut self, index: u32, begin: u32, block: &[u8]) -> PeerResult<u32> {
        if index != self.index {
            return Err(PeerError::PieceIndexMismatch {
                expected: self.index,
                got: index,
            });
        }

        let length = self.length();
        let end = begin as u64 + block.len() as u64;
        if begin >= length || end > length as u64 {
            return Err(PeerError::BlockOutOfBounds { begin, end, length });
        }

        // 每个请求只接受一次回复，重复的块不能计入已下载
        let block_len = block.len() as u32;
        let position = self
            .pending
            .iter()
            .position(|&pending| pending == (begin, block_len))
            .ok_or(PeerError::UnrequestedBlock {
                begin,
                length: block_len,
            })?;
        self.pending.swap_remove(position);

        self.data[begin as usize..end as usize].copy_from_slice(block);
        self.downloaded += block.len() as u32;
        self.backlog = self.backlog.saturating_sub(1);
        Ok(block.len() as u32)
    }

    /// 校验整个piece的SHA-1
    pub fn verify(self, hash: &[u8; HASH_LEN]) -> PeerResult<PieceResult> {
        if !verify_integrity(&self.data, hash) {
            return Err(PeerError::HashMismatch(self.index));
        }
        Ok(PieceResult {
            index: self.index,
            data: self.data,
        })
    }
}

pub fn verify_integrity(data: &[u8], hash: &[u8; HASH_LEN]) -> bool {
    Sha1::digest(data).as_slice() == &hash[..]
}

pub fn sha1_hash(data: &[u8]) -> [u8; HASH_LEN] {
    let mut hash = [0; HASH_LEN];
    hash.copy_from_slice(&Sha1::digest(data));
    hash
}
