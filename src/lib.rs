mod cli;
pub mod chunk;
pub mod error;
pub mod logger;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod transport;
mod window;

pub use crate::cli::{Cli, Mode};
pub use crate::error::DrtpError;
pub use crate::packet::{DrtpPacket, Flags, Header};
pub use crate::receiver::{Receiver, ReceiverConfig, ReceiverState, TransferReport};
pub use crate::sender::{Sender, SenderConfig, TransferSummary};
pub use crate::transport::Transport;
pub use crate::window::Window;

pub const HEADER_LEN: usize = 6;
pub const CHUNK_SIZE: usize = 994;
pub const MAX_DATAGRAM_SIZE: usize = HEADER_LEN + CHUNK_SIZE;
pub const RECV_BUF_SIZE: usize = 1024;

pub const DEF_WINDOW_SIZE: u16 = 3;
pub const DEF_TIMEOUT_MS: u64 = 500;
pub const DEF_IDLE_TIMEOUT_MS: u64 = 5000;
pub const MAX_RETRY_COUNT: u8 = 3;
