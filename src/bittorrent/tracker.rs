use crate::bittorrent::peer::{build_peers, Peer};
use crate::bittorrent::torrent::Torrent;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_bencode::de;
use serde_bytes::ByteBuf;
use std::borrow::Cow;
use std::time::Duration;
use url::Url;

/// tracker服务器发回的消息
/// 包含interval和peers
#[derive(Debug, Deserialize, Serialize)]
struct BencodeTracker {
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    //告诉客户端间隔多久再向服务端发一次请求
    #[serde(default)]
    interval: u32,
    // 紧凑格式的peer列表，每个6字节
    #[serde(default)]
    peers: ByteBuf,
}

/// 构建 tracker URL.
pub fn build_tracker_url(torrent: &Torrent, port: u16) -> Result<String> {
    // 解析文件中的tracker url
    let mut base_url = Url::parse(torrent.announce()).context("could not parse tracker url")?;
    let info_hash = torrent.info_hash().to_vec();
    let peer_id = torrent.peer_id().to_vec();

    // info_hash和peer_id是原始字节，需要逐字节编码
    base_url
        .query_pairs_mut()
        .encoding_override(Some(&|input| {
            if input != "!" {
                Cow::Borrowed(input.as_bytes())
            } else {
                Cow::Owned(info_hash.clone())
            }
        }))
        .append_pair("info_hash", "!");
    base_url
        .query_pairs_mut()
        .encoding_override(Some(&|input| {
            if input != "!" {
                Cow::Borrowed(input.as_bytes())
            } else {
                Cow::Owned(peer_id.clone())
            }
        }))
        .append_pair("peer_id", "!");
    base_url
        .query_pairs_mut()
        // 添加监听的端口
        .append_pair("port", &port.to_string())
        .append_pair("uploaded", "0")
        .append_pair("downloaded", "0")
        .append_pair("compact", "1")
        // 添加仍然需要下载的数量
        .append_pair("left", &torrent.length().to_string());
    Ok(base_url.to_string())
}

/// 解析tracker的回复
pub fn parse_tracker_response(response: &[u8]) -> Result<Vec<Peer>> {
    let tracker_bencode =
        de::from_bytes::<BencodeTracker>(response).context("could not decode tracker response")?;
    if let Some(reason) = tracker_bencode.failure_reason {
        return Err(anyhow!("tracker refused the request: {}", reason));
    }
    debug!("Tracker asked to re-announce every {}s", tracker_bencode.interval);
    build_peers(&tracker_bencode.peers)
}

/// 向track服务器发送请求获取所有peer的信息
pub async fn request_peers(torrent: &Torrent, port: u16) -> Result<Vec<Peer>> {
    let tracker_url = build_tracker_url(torrent, port)?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("could not connect to tracker")?;

    let response = client
        .get(&tracker_url)
        .send()
        .await
        .context("could not send request to tracker")?
        .bytes()
        .await
        .context("could not read response from tracker")?;

    let peers = parse_tracker_response(&response)?;
    info!("Tracker returned {} peers", peers.len());
    Ok(peers)
}
