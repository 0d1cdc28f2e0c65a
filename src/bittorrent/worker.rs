use crate::bittorrent::cancel::CancelToken;
use crate::bittorrent::client::*;
use crate::bittorrent::config::Settings;
use crate::bittorrent::error::{PeerError, PeerResult};
use crate::bittorrent::handshake::{HASH_LEN, PEER_ID_LEN};
use crate::bittorrent::message::*;
use crate::bittorrent::peer::*;
use crate::bittorrent::piece::*;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

/// 生产者定义，每个peer对应一个worker
pub struct Worker {
    peer: Peer,
    peer_id: [u8; PEER_ID_LEN],
    info_hash: [u8; HASH_LEN],
    settings: Settings,
    work_chan: (Sender<PieceWork>, Receiver<PieceWork>),
    result_chan: Sender<PieceResult>,
    cancel: CancelToken,
}

impl Worker {
    pub fn new(
        peer: Peer,
        peer_id: [u8; PEER_ID_LEN],
        info_hash: [u8; HASH_LEN],
        settings: Settings,
        work_chan: (Sender<PieceWork>, Receiver<PieceWork>),
        result_chan: Sender<PieceResult>,
        cancel: CancelToken,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            settings,
            work_chan,
            result_chan,
            cancel,
        }
    }

    /// 启动worker，直到连接出错或者下载被取消
    pub fn start_download(&self) {
        // 建立客户端，握手和bitfield任何一步失败都直接放弃这个peer
        let mut client = match Client::connect(
            self.peer.clone(),
            self.peer_id,
            self.info_hash,
            self.settings.clone(),
            self.cancel.clone(),
        ) {
            Ok(client) => client,
            Err(PeerError::Cancelled) => return,
            Err(e) => {
                warn!("Dropping peer {}: {}", self.peer, e);
                return;
            }
        };

        while let Some(piece_work) = self.next_work() {
            if !client.has_piece(piece_work.index) {
                // 如果对方没有这个piece就再发送到channel中
                self.requeue(piece_work);
                thread::yield_now();
                continue;
            }

            match download_piece(&mut client, &piece_work, &self.settings) {
                Ok(piece_result) => {
                    let index = piece_result.index;
                    if !self.submit(piece_result) {
                        return;
                    }
                    if let Err(e) = client.send_have(index) {
                        error!("could not notify peer {} that piece was downloaded: {}", self.peer, e);
                    }
                }
                Err(e) if !e.is_fatal() => {
                    // 校验错误重新请求，连接还可以继续用
                    warn!("{} (peer {})", e, self.peer);
                    self.requeue(piece_work);
                }
                Err(e) => {
                    if !matches!(e, PeerError::Cancelled) {
                        error!("Failed to download piece {} from peer {}: {}", piece_work.index, self.peer, e);
                    }
                    self.requeue(piece_work);
                    client.close();
                    return;
                }
            }
        }
    }

    /// 从work channel读取piece，期间检查取消信号
    fn next_work(&self) -> Option<PieceWork> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match self.work_chan.1.recv_timeout(self.settings.poll_interval) {
                Ok(piece_work) => return Some(piece_work),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// 放回任务队列，队列容量等于piece数量所以不会阻塞
    fn requeue(&self, piece_work: PieceWork) {
        if let Err(e) = self.work_chan.0.try_send(piece_work) {
            error!("could not send piece {} back to channel", e.into_inner().index);
        }
    }

    /// 将下载的piece发送到result channel中，取消之后不再发送
    fn submit(&self, piece_result: PieceResult) -> bool {
        let sent = self
            .cancel
            .unless_cancelled(|| self.result_chan.send(piece_result).is_ok());
        sent.unwrap_or(false)
    }
}

/// 通过一个已经就绪的连接下载一个piece，并校验SHA-1
pub fn download_piece(
    client: &mut Client,
    piece_work: &PieceWork,
    settings: &Settings,
) -> PeerResult<PieceResult> {
    let mut progress = PieceProgress::new(piece_work);
    // 整个piece的截止时间，收到消息不会延长
    let deadline = Instant::now() + settings.piece_timeout;

    while !progress.is_complete() {
        // 被阻塞时不能发请求
        if !client.is_choked() {
            while progress.backlog < settings.max_backlog {
                let (begin, length) = match progress.next_block(settings.block_size) {
                    Some(block) => block,
                    None => break,
                };
                client.send_request(progress.index, begin, length)?;
            }
        }

        match client.read_message(deadline)? {
            Some(Message::Choke) => client.read_choke(),
            Some(Message::Unchoke) => client.read_unchoke(),
            Some(Message::Have(index)) => client.read_have(index),
            Some(Message::Piece {
                index,
                begin,
                block,
            }) => {
                let n = progress.write_block(index, begin, &block)?;
                debug!(
                    "Download piece {} [{}:{}] from peer {}",
                    index,
                    begin,
                    begin + n,
                    client.peer()
                );
            }
            Some(other) => debug!("Ignore {} from peer {}", other.name(), client.peer()),
            None => {}
        }
    }
    info!("Successfully downloaded piece {}", piece_work.index);
    progress.verify(&piece_work.hash)
}
