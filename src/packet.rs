//! TFTP 패킷 코덱 (RFC 1350 + 2347)
//!
//! 모든 패킷은 2바이트 빅엔디안 opcode로 시작한다.
//! 파일명, 모드, 옵션 문자열은 NUL(0x00)로 종료된다.

use bytes::Bytes;
use std::fmt;

use crate::error::{Error, Result};

/// TFTP opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    Oack = 6,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Opcode> {
        match value {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Error),
            6 => Some(Opcode::Oack),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Rrq => "RRQ",
            Opcode::Wrq => "WRQ",
            Opcode::Data => "DATA",
            Opcode::Ack => "ACK",
            Opcode::Error => "ERROR",
            Opcode::Oack => "OACK",
        }
    }
}

/// ERROR 패킷의 에러 코드 (RFC 1350 §5 + RFC 2347)
///
/// 표준 밖의 코드도 버리지 않고 `Unknown`으로 보존한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Undefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileAlreadyExists,
    NoSuchUser,
    OptionNegotiation,
    Unknown(u16),
}

impl ErrorCode {
    pub fn from_u16(value: u16) -> ErrorCode {
        match value {
            0 => ErrorCode::Undefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiation,
            other => ErrorCode::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ErrorCode::Undefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFull => 3,
            ErrorCode::IllegalOperation => 4,
            ErrorCode::UnknownTransferId => 5,
            ErrorCode::FileAlreadyExists => 6,
            ErrorCode::NoSuchUser => 7,
            ErrorCode::OptionNegotiation => 8,
            ErrorCode::Unknown(code) => *code,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Undefined => "Undefined error",
            ErrorCode::FileNotFound => "File not found",
            ErrorCode::AccessViolation => "Access violation",
            ErrorCode::DiskFull => "Disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "Illegal TFTP operation",
            ErrorCode::UnknownTransferId => "Unknown transfer ID",
            ErrorCode::FileAlreadyExists => "File already exists",
            ErrorCode::NoSuchUser => "No such user",
            ErrorCode::OptionNegotiation => "Option negotiation failed",
            ErrorCode::Unknown(_) => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.default_message(), self.as_u16())
    }
}

/// 전송 모드. 모든 모드를 바이트 그대로 다룬다 (개행 변환 없음).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Octet,
    Netascii,
    Mail,
}

impl Mode {
    /// 대소문자 무시 파싱 (RFC 1350은 "octet"/"OCTET" 모두 허용)
    pub fn parse(s: &str) -> Option<Mode> {
        if s.eq_ignore_ascii_case("octet") {
            Some(Mode::Octet)
        } else if s.eq_ignore_ascii_case("netascii") {
            Some(Mode::Netascii)
        } else if s.eq_ignore_ascii_case("mail") {
            Some(Mode::Mail)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Octet => "octet",
            Mode::Netascii => "netascii",
            Mode::Mail => "mail",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TFTP 패킷
///
/// 옵션은 요청에 실린 순서를 보존해야 하므로 `Vec<(String, String)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq {
        filename: String,
        mode: Mode,
        options: Vec<(String, String)>,
    },
    Wrq {
        filename: String,
        mode: Mode,
        options: Vec<(String, String)>,
    },
    Data {
        block: u16,
        payload: Bytes,
    },
    Ack {
        block: u16,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Oack {
        options: Vec<(String, String)>,
    },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq { .. } => Opcode::Rrq,
            Packet::Wrq { .. } => Opcode::Wrq,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack { .. } => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
            Packet::Oack { .. } => Opcode::Oack,
        }
    }

    /// 기본 메시지를 실은 ERROR 패킷
    pub fn error_from(code: ErrorCode) -> Packet {
        Packet::Error {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// 와이어 인코딩
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        buf.extend_from_slice(&self.opcode().as_u16().to_be_bytes());

        match self {
            Packet::Rrq {
                filename,
                mode,
                options,
            }
            | Packet::Wrq {
                filename,
                mode,
                options,
            } => {
                buf.extend_from_slice(filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(mode.as_str().as_bytes());
                buf.push(0);
                encode_pairs(&mut buf, options);
            }
            Packet::Data { block, payload } => {
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Packet::Ack { block } => {
                buf.extend_from_slice(&block.to_be_bytes());
            }
            Packet::Error { code, message } => {
                buf.extend_from_slice(&code.as_u16().to_be_bytes());
                buf.extend_from_slice(message.as_bytes());
                buf.push(0);
            }
            Packet::Oack { options } => {
                encode_pairs(&mut buf, options);
            }
        }

        buf
    }

    /// 와이어 디코딩. 실패는 전부 `Error::MalformedPacket`.
    pub fn decode(buf: &[u8]) -> Result<Packet> {
        if buf.len() < 2 {
            return Err(Error::MalformedPacket {
                reason: "opcode보다 짧은 데이터그램",
            });
        }
        let opcode = Opcode::from_u16(u16::from_be_bytes([buf[0], buf[1]])).ok_or(
            Error::MalformedPacket {
                reason: "알 수 없는 opcode",
            },
        )?;
        let rest = &buf[2..];

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, rest) = take_cstr(rest, "파일명에 종료 NUL 없음")?;
                let (mode_str, rest) = take_cstr(rest, "모드에 종료 NUL 없음")?;
                let mode = Mode::parse(mode_str).ok_or(Error::MalformedPacket {
                    reason: "알 수 없는 전송 모드",
                })?;
                let options = take_pairs(rest)?;
                let filename = filename.to_string();
                Ok(match opcode {
                    Opcode::Rrq => Packet::Rrq {
                        filename,
                        mode,
                        options,
                    },
                    _ => Packet::Wrq {
                        filename,
                        mode,
                        options,
                    },
                })
            }
            Opcode::Data => {
                if rest.len() < 2 {
                    return Err(Error::MalformedPacket {
                        reason: "블록 번호가 없는 DATA",
                    });
                }
                Ok(Packet::Data {
                    block: u16::from_be_bytes([rest[0], rest[1]]),
                    payload: Bytes::copy_from_slice(&rest[2..]),
                })
            }
            Opcode::Ack => {
                if rest.len() < 2 {
                    return Err(Error::MalformedPacket {
                        reason: "블록 번호가 없는 ACK",
                    });
                }
                Ok(Packet::Ack {
                    block: u16::from_be_bytes([rest[0], rest[1]]),
                })
            }
            Opcode::Error => {
                if rest.len() < 2 {
                    return Err(Error::MalformedPacket {
                        reason: "에러 코드가 없는 ERROR",
                    });
                }
                let code = ErrorCode::from_u16(u16::from_be_bytes([rest[0], rest[1]]));
                let (message, _) = take_cstr(&rest[2..], "에러 메시지에 종료 NUL 없음")?;
                Ok(Packet::Error {
                    code,
                    message: message.to_string(),
                })
            }
            Opcode::Oack => Ok(Packet::Oack {
                options: take_pairs(rest)?,
            }),
        }
    }
}

fn encode_pairs(buf: &mut Vec<u8>, pairs: &[(String, String)]) {
    for (name, value) in pairs {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
}

/// NUL 종료 문자열 하나를 떼어낸다
fn take_cstr<'a>(buf: &'a [u8], reason: &'static str) -> Result<(&'a str, &'a [u8])> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::MalformedPacket { reason })?;
    let s = std::str::from_utf8(&buf[..pos]).map_err(|_| Error::MalformedPacket { reason })?;
    Ok((s, &buf[pos + 1..]))
}

/// 옵션 이름/값 쌍들을 끝까지 떼어낸다. 이름은 소문자로 정규화 (RFC 2347).
fn take_pairs(mut rest: &[u8]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    while !rest.is_empty() {
        let (name, r) = take_cstr(rest, "옵션 이름에 종료 NUL 없음")?;
        let (value, r) = take_cstr(r, "옵션 값에 종료 NUL 없음")?;
        pairs.push((name.to_ascii_lowercase(), value.to_string()));
        rest = r;
    }
    Ok(pairs)
}
