//! # RTFTP
//!
//! RFC 1350 + 2347~2349 기반 락스텝 TFTP 전송 엔진
//!
//! ## 핵심 특징
//! - **락스텝**: 블록 하나가 ACK될 때까지 다음 블록을 보내지 않음
//! - **옵션 협상**: blksize / timeout / tsize (RFC 2347~2349)
//! - **재전송 복구**: 타임아웃 시 마지막 패킷 재전송, 예산 소진 시 실패
//! - **TID 격리**: 전송마다 임시 UDP 포트, 다른 TID에는 ERROR(5) 회신
//! - **전송 단위 통계**: 전역 상태 없이 컨텍스트가 단독 소유
//! - **클라이언트/서버**: 같은 상태 기계를 역할만 바꿔 공유

pub mod client;
pub mod config;
pub mod error;
pub mod options;
pub mod packet;
pub mod server;
pub mod stats;
pub mod transfer;

pub use client::TftpClient;
pub use config::Config;
pub use error::{Error, Result};
pub use options::TransferOptions;
pub use packet::{ErrorCode, Mode, Opcode, Packet};
pub use server::{ServerStats, TftpServer};
pub use stats::TransferStats;
pub use transfer::{TransferContext, TransferState};

/// 기본 블록 크기 (바이트, RFC 1350)
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// blksize 옵션 최소값 (RFC 2348)
pub const MIN_BLOCK_SIZE: usize = 8;

/// blksize 옵션 최대값 (RFC 2348)
pub const MAX_BLOCK_SIZE: usize = 65464;

/// 기본 수신 타임아웃 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// 기본 재시도 횟수
pub const DEFAULT_RETRIES: u32 = 5;

/// 최대 데이터그램 크기 (opcode 2 + 블록 번호 2 + 최대 블록)
pub const MAX_PACKET_SIZE: usize = MAX_BLOCK_SIZE + 4;
