pub mod bitfield;
pub mod cancel;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod handshake;
pub mod message;
pub mod parser;
pub mod peer;
pub mod piece;
#[cfg(test)]
mod testing;
pub mod torrent;
pub mod tracker;
pub mod worker;

use crate::bittorrent::config::Settings;
use crate::bittorrent::parser::CommandArgument;
use anyhow::{anyhow, Result};
use colorful::{Color, Colorful};
use std::path::{Path, PathBuf};
use torrent::*;

async fn run(command: &CommandArgument) -> Result<()> {
    // 检查文件是否存在
    let torrent_path = match command.get_torrent() {
        Some(path) if Path::new(path).exists() => PathBuf::from(path),
        _ => return Err(anyhow!("could not find torrent")),
    };

    // 打开torrent文件
    let torrent = Torrent::open(&torrent_path)?;
    info!(
        "Opened {:?}, info hash {}",
        torrent.name(),
        hex::encode(torrent.info_hash())
    );

    // 连接tracker并获取peer
    let settings = Settings::default().with_port(command.get_port());
    let peers = tracker::request_peers(&torrent, settings.port).await?;
    if peers.is_empty() {
        return Err(anyhow!("could not find peers"));
    }

    let output_filepath = PathBuf::from(command.get_target_path().unwrap_or(torrent.name()));

    // 下载在普通线程中进行
    tokio::task::spawn_blocking(move || torrent.download(&peers, settings, &output_filepath))
        .await??;
    Ok(())
}

pub async fn execute() {
    //初始化日志
    pretty_env_logger::init_timed();
    // 解析参数
    let mut command = CommandArgument::new();
    if let Err(error) = command.parse() {
        eprintln!("{}", error.as_str().color(Color::Red));
        std::process::exit(1);
    }
    if let Err(error) = run(&command).await {
        let message = format!("Error: {:#}", error);
        eprintln!("{}", message.as_str().color(Color::Red));
        std::process::exit(1);
    }
    std::process::exit(0);
}
