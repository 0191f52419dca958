//! 옵션 협상 (RFC 2347~2349)
//!
//! blksize 8~65464, timeout 1~255초, tsize >= 0 (0은 "크기 알려달라").
//! 모르는 옵션 이름은 무시하고, 범위를 벗어난 값은 에러다.

use crate::error::{Error, Result};
use crate::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

pub const OPT_BLKSIZE: &str = "blksize";
pub const OPT_TIMEOUT: &str = "timeout";
pub const OPT_TSIZE: &str = "tsize";

/// 한 전송의 확정(또는 요청) 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// 블록 크기 (바이트). 협상 없으면 512.
    pub block_size: usize,

    /// timeout 옵션 값 (초). None이면 옵션을 싣지 않는다.
    pub timeout_secs: Option<u8>,

    /// tsize 옵션 값. 읽기 요청에서 0은 "크기를 알려달라".
    pub transfer_size: Option<u64>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            timeout_secs: None,
            transfer_size: None,
        }
    }
}

impl TransferOptions {
    /// RRQ/WRQ에 실을 옵션 쌍. 기본값과 같은 blksize는 싣지 않는다.
    pub fn to_request_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if self.block_size != DEFAULT_BLOCK_SIZE {
            pairs.push((OPT_BLKSIZE.to_string(), self.block_size.to_string()));
        }
        if let Some(secs) = self.timeout_secs {
            pairs.push((OPT_TIMEOUT.to_string(), secs.to_string()));
        }
        if let Some(size) = self.transfer_size {
            pairs.push((OPT_TSIZE.to_string(), size.to_string()));
        }
        pairs
    }

    /// 수신한 옵션 쌍을 파싱/검증한다. 모르는 이름은 무시 (RFC 2347).
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<TransferOptions> {
        let mut opts = TransferOptions::default();
        for (name, value) in pairs {
            match name.as_str() {
                OPT_BLKSIZE => opts.block_size = parse_block_size(value)?,
                OPT_TIMEOUT => opts.timeout_secs = Some(parse_timeout(value)?),
                OPT_TSIZE => opts.transfer_size = Some(parse_tsize(value)?),
                _ => {}
            }
        }
        Ok(opts)
    }
}

pub fn parse_block_size(value: &str) -> Result<usize> {
    let n: usize = value.parse().map_err(|_| Error::InvalidOption {
        name: OPT_BLKSIZE.to_string(),
        value: value.to_string(),
        reason: "정수가 아님",
    })?;
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&n) {
        return Err(Error::InvalidOption {
            name: OPT_BLKSIZE.to_string(),
            value: value.to_string(),
            reason: "허용 범위(8~65464) 밖",
        });
    }
    Ok(n)
}

pub fn parse_timeout(value: &str) -> Result<u8> {
    let n: u64 = value.parse().map_err(|_| Error::InvalidOption {
        name: OPT_TIMEOUT.to_string(),
        value: value.to_string(),
        reason: "정수가 아님",
    })?;
    if !(1..=255).contains(&n) {
        return Err(Error::InvalidOption {
            name: OPT_TIMEOUT.to_string(),
            value: value.to_string(),
            reason: "허용 범위(1~255초) 밖",
        });
    }
    Ok(n as u8)
}

pub fn parse_tsize(value: &str) -> Result<u64> {
    value.parse().map_err(|_| Error::InvalidOption {
        name: OPT_TSIZE.to_string(),
        value: value.to_string(),
        reason: "음이 아닌 정수가 아님",
    })
}

/// 서버측 협상.
///
/// 요청 순서를 보존한 OACK 쌍과 확정 옵션을 돌려준다. blksize는
/// 서버 허용치까지 하향 조정, timeout은 그대로 수락, tsize는 읽기면
/// 실제 파일 크기로 채우고 쓰기면 요청값을 되돌린다.
pub fn negotiate(
    requested: &[(String, String)],
    max_block_size: usize,
    transfer_size: Option<u64>,
) -> Result<(TransferOptions, Vec<(String, String)>)> {
    let mut accepted = TransferOptions::default();
    let mut oack = Vec::new();

    for (name, value) in requested {
        match name.as_str() {
            OPT_BLKSIZE => {
                let asked = parse_block_size(value)?;
                let agreed = asked.min(max_block_size);
                accepted.block_size = agreed;
                oack.push((OPT_BLKSIZE.to_string(), agreed.to_string()));
            }
            OPT_TIMEOUT => {
                let secs = parse_timeout(value)?;
                accepted.timeout_secs = Some(secs);
                oack.push((OPT_TIMEOUT.to_string(), secs.to_string()));
            }
            OPT_TSIZE => {
                let asked = parse_tsize(value)?;
                let answer = transfer_size.unwrap_or(asked);
                accepted.transfer_size = Some(answer);
                oack.push((OPT_TSIZE.to_string(), answer.to_string()));
            }
            _ => {}
        }
    }

    Ok((accepted, oack))
}

/// 클라이언트측 OACK 검증. OACK의 값이 최종 확정치다.
///
/// 요청한 적 없는 옵션, 요청보다 커진 blksize, 범위 밖 값은
/// 전부 `InvalidOption`이고 드라이버가 ERROR(8)로 중단한다.
pub fn accept_oack(
    requested: &TransferOptions,
    oack: &[(String, String)],
) -> Result<TransferOptions> {
    let mut accepted = TransferOptions::default();

    for (name, value) in oack {
        match name.as_str() {
            OPT_BLKSIZE => {
                if requested.block_size == DEFAULT_BLOCK_SIZE {
                    return Err(Error::InvalidOption {
                        name: name.clone(),
                        value: value.clone(),
                        reason: "요청한 적 없는 옵션",
                    });
                }
                let n = parse_block_size(value)?;
                if n > requested.block_size {
                    return Err(Error::InvalidOption {
                        name: name.clone(),
                        value: value.clone(),
                        reason: "요청보다 큰 블록 크기",
                    });
                }
                accepted.block_size = n;
            }
            OPT_TIMEOUT => {
                if requested.timeout_secs.is_none() {
                    return Err(Error::InvalidOption {
                        name: name.clone(),
                        value: value.clone(),
                        reason: "요청한 적 없는 옵션",
                    });
                }
                accepted.timeout_secs = Some(parse_timeout(value)?);
            }
            OPT_TSIZE => {
                if requested.transfer_size.is_none() {
                    return Err(Error::InvalidOption {
                        name: name.clone(),
                        value: value.clone(),
                        reason: "요청한 적 없는 옵션",
                    });
                }
                accepted.transfer_size = Some(parse_tsize(value)?);
            }
            _ => {
                return Err(Error::InvalidOption {
                    name: name.clone(),
                    value: value.clone(),
                    reason: "요청한 적 없는 옵션",
                });
            }
        }
    }

    Ok(accepted)
}
