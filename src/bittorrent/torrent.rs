use crate::bittorrent::config::Settings;
use crate::bittorrent::download::Downloader;
use crate::bittorrent::handshake::{HASH_LEN, PEER_ID_LEN};
use crate::bittorrent::peer::Peer;
use crate::bittorrent::piece::{sha1_hash, PieceWork};

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;
use std::fs;
use std::path::Path;

/// Torrent structure.
#[derive(Default, Debug, Clone)]
pub struct Torrent {
    // 主服务器的url
    announce: String,
    //整个文件的hash校验值
    info_hash: [u8; HASH_LEN],
    // SHA-1 hashes of each pieces
    pieces_hashes: Vec<[u8; HASH_LEN]>,
    // 每个piece的大小
    piece_length: u32,
    // 文件总大小
    length: u64,
    // Suggested filename where to save the file
    name: String,
    // 标识本机的id
    peer_id: [u8; PEER_ID_LEN],
}

/// info字典，字段顺序就是编码时的顺序，info hash依赖它
#[derive(Debug, Deserialize, Serialize)]
struct BencodeInfo {
    #[serde(rename = "length")]
    length: u64,
    #[serde(rename = "md5sum", default, skip_serializing_if = "Option::is_none")]
    md5sum: Option<String>,
    /// 文件名称
    #[serde(rename = "name")]
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u32,
    // 所有piece的hash
    #[serde(rename = "pieces")]
    pieces: ByteBuf,
    #[serde(rename = "private", default, skip_serializing_if = "Option::is_none")]
    private: Option<u8>,
}

/// BencodeTorrent structure.
#[derive(Debug, Deserialize, Serialize)]
struct BencodeTorrent {
    // URL of the tracker
    #[serde(default)]
    announce: String,
    info: BencodeInfo,
}

impl BencodeInfo {
    /// HASH编码信息得到文件的唯一标识
    fn hash(&self) -> Result<[u8; HASH_LEN]> {
        let buf: Vec<u8> = ser::to_bytes::<BencodeInfo>(self)?;
        Ok(sha1_hash(&buf))
    }

    /// 将所有piece的hash校验值切分
    fn split_pieces_hashes(&self) -> Result<Vec<[u8; HASH_LEN]>> {
        // 检查是否是合法的序列
        if self.pieces.len() % HASH_LEN != 0 {
            return Err(anyhow!("torrent is invalid: malformed pieces"));
        }
        Ok(self
            .pieces
            .chunks(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0; HASH_LEN];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

impl Torrent {
    /// 打开torrent文件构建
    pub fn open(filepath: &Path) -> Result<Torrent> {
        let buf = fs::read(filepath)
            .with_context(|| format!("could not open torrent {}", filepath.display()))?;
        Torrent::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Torrent> {
        let bencode = de::from_bytes::<BencodeTorrent>(buf).context("could not decode torrent")?;
        if bencode.info.piece_length == 0 {
            return Err(anyhow!("torrent is invalid: piece length is 0"));
        }

        let pieces_hashes = bencode.info.split_pieces_hashes()?;
        let expected = (bencode.info.length + bencode.info.piece_length as u64 - 1)
            / bencode.info.piece_length as u64;
        if pieces_hashes.len() as u64 != expected {
            return Err(anyhow!(
                "torrent is invalid: {} piece hashes for {} pieces",
                pieces_hashes.len(),
                expected
            ));
        }

        // 生成一个随机peer id
        let peer_id: [u8; PEER_ID_LEN] = rand::thread_rng().gen();

        Ok(Torrent {
            announce: bencode.announce.to_owned(),
            info_hash: bencode.info.hash()?,
            pieces_hashes,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name.to_owned(),
            peer_id,
        })
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }

    pub fn info_hash(&self) -> &[u8; HASH_LEN] {
        &self.info_hash
    }

    pub fn peer_id(&self) -> &[u8; PEER_ID_LEN] {
        &self.peer_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn piece_count(&self) -> usize {
        self.pieces_hashes.len()
    }

    /// 获取piece的起始和结束位置
    /// 最后一个piece的长度可能不足piece length
    pub fn piece_bounds(&self, index: u32) -> (u64, u64) {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);
        (begin, end)
    }

    /// 每个piece对应一个任务
    pub fn piece_work(&self) -> Vec<PieceWork> {
        self.pieces_hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                let (begin, end) = self.piece_bounds(index as u32);
                PieceWork::new(index as u32, *hash, (end - begin) as u32)
            })
            .collect()
    }

    /// 下载文件并保存到 `output`
    pub fn download(&self, peers: &[Peer], settings: Settings, output: &Path) -> Result<()> {
        println!(
            "Downloading {:?} ({:?} pieces)",
            self.name,
            self.pieces_hashes.len(),
        );
        let length = usize::try_from(self.length).context("file is too large")?;
        let downloader = Downloader::new(
            self.peer_id,
            self.info_hash,
            self.piece_work(),
            self.piece_length,
            length,
            settings,
        );

        // 创建进度条
        let pb = ProgressBar::new(self.length);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
                .progress_chars("#>-"),
        );
        let total = self.length as f64;
        let assembler = downloader.run(peers, |progress| {
            pb.set_position((progress * total) as u64);
        })?;
        pb.finish();

        assembler.persist(output)?;
        println!("Saved in {:?}.", output);
        Ok(())
    }
}
