//! 에러 타입 정의

use thiserror::Error;

use crate::packet::ErrorCode;

/// RTFTP 전송 엔진 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("잘못된 패킷: {reason}")]
    MalformedPacket { reason: &'static str },

    #[error("유효하지 않은 옵션: {name}={value} ({reason})")]
    InvalidOption {
        name: String,
        value: String,
        reason: &'static str,
    },

    #[error("상대측 에러 패킷: {code} - {message}")]
    Peer { code: ErrorCode, message: String },

    #[error("재시도 소진: last_block={last_block}, retries={retries}")]
    Timeout { last_block: u16, retries: u32 },

    #[error("전송 취소됨")]
    Cancelled,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
