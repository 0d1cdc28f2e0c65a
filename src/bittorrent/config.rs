use std::time::Duration;

// 最大请求数量
pub const MAX_BACKLOG: u32 = 5;

//每次请求的大小
pub const BLOCK_SIZE: u32 = 16384;

//监听端口
pub const PORT: u16 = 6881;

/// 下载过程中用到的各种超时和限制
#[derive(Debug, Clone)]
pub struct Settings {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub bitfield_timeout: Duration,
    /// 下载一个piece的总时间，不会因为收到消息而延长
    pub piece_timeout: Duration,
    /// 检查取消信号的间隔
    pub poll_interval: Duration,
    pub block_size: u32,
    pub max_backlog: u32,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(200),
            block_size: BLOCK_SIZE,
            max_backlog: MAX_BACKLOG,
            port: PORT,
        }
    }
}

impl Settings {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
