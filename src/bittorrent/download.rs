use crate::bittorrent::cancel::CancelToken;
use crate::bittorrent::config::Settings;
use crate::bittorrent::handshake::{HASH_LEN, PEER_ID_LEN};
use crate::bittorrent::peer::Peer;
use crate::bittorrent::piece::{PieceResult, PieceWork};
use crate::bittorrent::worker::Worker;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread::{self, JoinHandle};

/// 把校验过的piece写到文件大小的缓冲区里
pub struct Assembler {
    data: Vec<u8>,
    piece_length: u32,
    // 已经写入的piece，同一个索引只写一次
    written: Vec<bool>,
    completed: usize,
}

impl Assembler {
    pub fn new(length: usize, piece_length: u32, piece_count: usize) -> Assembler {
        Assembler {
            data: vec![0; length],
            piece_length,
            written: vec![false; piece_count],
            completed: 0,
        }
    }

    /// 写入一个piece，返回新的进度；重复或者越界的piece返回 `None`
    pub fn accept(&mut self, piece_result: PieceResult) -> Option<f64> {
        let index = piece_result.index as usize;
        match self.written.get(index) {
            Some(false) => {}
            Some(true) => {
                warn!("Piece {} was already written, ignoring duplicate", index);
                return None;
            }
            None => {
                warn!("Received piece {} outside of the torrent", index);
                return None;
            }
        }

        let begin = index * self.piece_length as usize;
        let end = begin + piece_result.data.len();
        if end > self.data.len() {
            warn!("Piece {} [{}:{}] does not fit in the file", index, begin, end);
            return None;
        }
        self.data[begin..end].copy_from_slice(&piece_result.data);
        self.written[index] = true;
        self.completed += 1;
        Some(self.progress())
    }

    pub fn progress(&self) -> f64 {
        if self.written.is_empty() {
            return 1.0;
        }
        self.completed as f64 / self.written.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.written.len()
    }

    /// 一次性写入文件
    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .with_context(|| format!("could not create file {}", path.display()))?;
        file.write_all(&self.data)
            .with_context(|| format!("could not write data to {}", path.display()))?;
        Ok(())
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// 调度器：每个peer一个worker，共享任务队列和结果队列
pub struct Downloader {
    peer_id: [u8; PEER_ID_LEN],
    info_hash: [u8; HASH_LEN],
    pieces: Vec<PieceWork>,
    piece_length: u32,
    length: usize,
    settings: Settings,
}

impl Downloader {
    pub fn new(
        peer_id: [u8; PEER_ID_LEN],
        info_hash: [u8; HASH_LEN],
        pieces: Vec<PieceWork>,
        piece_length: u32,
        length: usize,
        settings: Settings,
    ) -> Downloader {
        Downloader {
            peer_id,
            info_hash,
            pieces,
            piece_length,
            length,
            settings,
        }
    }

    /// 下载所有piece，每写入一个piece调用一次 `on_progress`
    pub fn run<F: FnMut(f64)>(&self, peers: &[Peer], on_progress: F) -> Result<Assembler> {
        let mut assembler = Assembler::new(self.length, self.piece_length, self.pieces.len());
        if assembler.is_complete() {
            return Ok(assembler);
        }

        // 容量等于piece数量，放回任务时不会阻塞
        let work_chan: (Sender<PieceWork>, Receiver<PieceWork>) = bounded(self.pieces.len());
        let (result_tx, result_rx) = unbounded();
        for piece_work in &self.pieces {
            work_chan
                .0
                .try_send(piece_work.clone())
                .map_err(|_| anyhow!("could not send piece to channel"))?;
        }

        let cancel = CancelToken::new();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(peers.len());
        for peer in peers {
            let worker = Worker::new(
                peer.clone(),
                self.peer_id,
                self.info_hash,
                self.settings.clone(),
                work_chan.clone(),
                result_tx.clone(),
                cancel.clone(),
            );
            // 在新的线程工作
            let handle = thread::Builder::new()
                .name(format!("peer-{}", peer.id))
                .spawn(move || worker.start_download())
                .context("could not spawn worker thread")?;
            handles.push(handle);
        }
        // 所有worker都退出之后结果队列会断开
        drop(result_tx);

        let outcome = self.assemble(&mut assembler, &result_rx, on_progress);

        // 先设置取消信号，等所有worker退出后才关闭结果队列
        cancel.cancel();
        for handle in handles {
            if handle.join().is_err() {
                error!("a worker thread panicked");
            }
        }
        drop(result_rx);

        outcome.map(|_| assembler)
    }

    fn assemble<F: FnMut(f64)>(
        &self,
        assembler: &mut Assembler,
        result_rx: &Receiver<PieceResult>,
        mut on_progress: F,
    ) -> Result<()> {
        while !assembler.is_complete() {
            let piece_result = result_rx
                .recv()
                .map_err(|_| anyhow!("every peer disconnected before the download finished"))?;
            let index = piece_result.index;
            if let Some(progress) = assembler.accept(piece_result) {
                info!(
                    "Downloaded piece {}, progress: ({:.2}%)",
                    index,
                    progress * 100.0
                );
                on_progress(progress);
            }
        }
        Ok(())
    }
}
