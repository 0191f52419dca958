//! 전송 설정

use std::time::Duration;

use crate::error::{Error, Result};
use crate::{
    DEFAULT_BLOCK_SIZE, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS, MAX_BLOCK_SIZE, MAX_PACKET_SIZE,
    MIN_BLOCK_SIZE,
};

/// RTFTP 전송 설정
///
/// 클라이언트에서는 요청할 옵션, 서버에서는 허용 한도로 쓰인다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 블록 크기 (바이트). 클라이언트는 이 값을 blksize 옵션으로
    /// 요청하고(512면 옵션을 싣지 않음), 서버는 이 값까지 하향 협상한다.
    pub block_size: usize,

    /// 로컬 수신 타임아웃. 이 시간 안에 응답이 없으면 마지막 패킷을
    /// 재전송한다.
    pub timeout: Duration,

    /// 재시도 횟수 (최초 전송 제외)
    pub retries: u32,

    /// timeout 옵션(RFC 2349)을 협상할지 여부
    pub negotiate_timeout: bool,

    /// 읽기 요청에 tsize=0을 실어 파일 크기를 물어볼지 여부
    pub request_tsize: bool,

    /// 수신 버퍼 크기. 최대 데이터그램(65468)보다 작으면 안 된다.
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            negotiate_timeout: false,
            request_tsize: true,
            recv_buffer_size: MAX_PACKET_SIZE,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 근거리망용 설정: 큰 블록, 짧은 타임아웃
    pub fn lan() -> Self {
        Self {
            block_size: 8192,
            timeout: Duration::from_secs(1),
            retries: 3,
            negotiate_timeout: false,
            request_tsize: true,
            recv_buffer_size: MAX_PACKET_SIZE,
        }
    }

    /// 손실 많은 망용 설정: 기본 블록, 긴 타임아웃, 많은 재시도
    pub fn lossy() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            timeout: Duration::from_secs(8),
            retries: 10,
            negotiate_timeout: true,
            request_tsize: true,
            recv_buffer_size: MAX_PACKET_SIZE,
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(Error::InvalidOption {
                name: "blksize".to_string(),
                value: self.block_size.to_string(),
                reason: "허용 범위(8~65464) 밖",
            });
        }
        Ok(())
    }

    /// timeout 옵션에 실을 초 단위 값 (RFC 2349는 1~255초만 허용)
    pub(crate) fn wire_timeout_secs(&self) -> u8 {
        self.timeout.as_secs().clamp(1, 255) as u8
    }
}
