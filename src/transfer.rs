//! 락스텝 전송 상태 기계
//!
//! TFTP는 블록 하나를 ACK 받기 전에는 다음 블록을 보내지 않는다.
//! 따라서 한 전송에는 항상 "마지막으로 보낸 패킷" 하나만 있고,
//! 타임아웃 복구는 그 패킷을 다시 보내는 것이 전부다.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::TransferOptions;
use crate::packet::{ErrorCode, Packet};
use crate::stats::TransferStats;

/// 전송 진행 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Init,
    SentRequest,
    Transferring,
    Complete,
    Errored,
}

/// 수신 시도 한 번의 결과
enum Incoming {
    Packet(Packet),
    TimedOut,
    /// 디코드 불가 데이터그램. 전송 중에는 타임아웃과 같게 취급한다.
    Bad,
}

/// 단일 전송의 컨텍스트
///
/// 소켓, 확정된 상대 TID, 협상된 블록 크기, 재시도 예산, 통계를
/// 단독 소유한다. 세션 간에 공유되는 것은 없다.
pub struct TransferContext {
    socket: UdpSocket,
    peer: SocketAddr,
    peer_latched: bool,
    block_size: usize,
    timeout: Duration,
    retries: u32,
    abort: Arc<AtomicBool>,
    last_sent: Vec<u8>,
    started: bool,
    state: TransferState,
    stats: TransferStats,
    recv_buf: Vec<u8>,
}

impl TransferContext {
    pub fn new(
        socket: UdpSocket,
        peer: SocketAddr,
        config: &Config,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            socket,
            peer,
            peer_latched: false,
            block_size: crate::DEFAULT_BLOCK_SIZE,
            timeout: config.timeout,
            retries: config.retries,
            abort,
            last_sent: Vec::new(),
            started: false,
            state: TransferState::Init,
            stats: TransferStats::new(),
            recv_buf: vec![0u8; config.recv_buffer_size.max(crate::MAX_PACKET_SIZE)],
        }
    }

    /// 상대 TID가 이미 확정된 컨텍스트 (서버측: 요청의 소스 주소)
    pub fn latched(mut self) -> Self {
        self.peer_latched = true;
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 통계 스냅샷을 꺼내며 컨텍스트를 닫는다 (소켓 해제)
    pub fn into_stats(mut self) -> TransferStats {
        self.stats.finish();
        self.stats
    }

    /// 협상 결과 반영. OACK의 timeout은 로컬 타임아웃도 덮어쓴다.
    pub fn apply_options(&mut self, options: &TransferOptions) {
        self.block_size = options.block_size;
        if let Some(secs) = options.timeout_secs {
            self.timeout = Duration::from_secs(secs as u64);
        }
    }

    /// 패킷 전송. 보낸 바이트를 재전송용으로 보관한다.
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode();
        if !self.started {
            self.stats.restart();
            self.started = true;
        }
        self.socket.send_to(&bytes, self.peer).await?;
        debug!("송신 {} -> {}", packet.opcode().name(), self.peer);
        self.last_sent = bytes;
        if self.state == TransferState::Init {
            self.state = TransferState::SentRequest;
        }
        Ok(())
    }

    /// 마지막으로 보낸 패킷 재전송
    async fn resend_last(&mut self) -> Result<()> {
        self.socket.send_to(&self.last_sent, self.peer).await?;
        self.stats.record_retransmission(self.last_sent.len());
        Ok(())
    }

    /// ERROR 패킷 전송. 응답을 기다리지 않으므로 실패해도 무시하고,
    /// 재전송 버퍼도 건드리지 않는다.
    pub async fn send_error(&mut self, code: ErrorCode, message: &str) {
        let packet = Packet::Error {
            code,
            message: message.to_string(),
        };
        let _ = self.socket.send_to(&packet.encode(), self.peer).await;
    }

    /// 수신 시도 한 번. 취소 플래그 확인 후 타임아웃까지 기다린다.
    ///
    /// 첫 응답의 소스가 이 세션의 상대 TID로 확정된다. 확정 뒤
    /// 다른 주소에서 온 데이터그램은 ERROR(5)를 회신하고 계속
    /// 기다린다 (RFC 1350 §4).
    async fn recv_attempt(&mut self) -> Result<Incoming> {
        if self.abort.load(Ordering::Relaxed) {
            self.state = TransferState::Errored;
            self.stats.finish();
            return Err(Error::Cancelled);
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Incoming::TimedOut);
            }

            match tokio::time::timeout(remaining, self.socket.recv_from(&mut self.recv_buf)).await {
                Ok(Ok((len, src))) => {
                    if self.peer_latched {
                        if src != self.peer {
                            debug!("알 수 없는 TID {} 무시", src);
                            let err = Packet::error_from(ErrorCode::UnknownTransferId);
                            let _ = self.socket.send_to(&err.encode(), src).await;
                            continue;
                        }
                    } else {
                        if src.ip() != self.peer.ip() {
                            debug!("예상 밖 주소 {}의 첫 응답 무시", src);
                            continue;
                        }
                        self.peer = src;
                        self.peer_latched = true;
                        debug!("상대 TID 확정: {}", src);
                    }

                    return match Packet::decode(&self.recv_buf[..len]) {
                        Ok(packet) => Ok(Incoming::Packet(packet)),
                        Err(e) => {
                            warn!("{}: 디코드 불가 데이터그램 ({})", self.peer, e);
                            Ok(Incoming::Bad)
                        }
                    };
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(Incoming::TimedOut),
            }
        }
    }

    /// 요청(RRQ/WRQ)에 대한 첫 응답 대기
    ///
    /// 타임아웃이면 요청 자체를 재전송하므로, 예산이 다하면 요청은
    /// 정확히 `1 + retries`번 나간 상태다. 디코드 불가 첫 응답은
    /// 협상을 신뢰할 수 없으므로 즉시 실패한다.
    pub async fn await_first_reply(&mut self) -> Result<Packet> {
        let mut retries_left = self.retries;
        loop {
            match self.recv_attempt().await? {
                Incoming::Packet(packet) => return Ok(packet),
                Incoming::Bad => {
                    self.state = TransferState::Errored;
                    self.stats.finish();
                    return Err(Error::MalformedPacket {
                        reason: "첫 응답을 디코드할 수 없음",
                    });
                }
                Incoming::TimedOut => {
                    if retries_left == 0 {
                        self.state = TransferState::Errored;
                        self.stats.finish();
                        return Err(Error::Timeout {
                            last_block: 0,
                            retries: self.retries,
                        });
                    }
                    retries_left -= 1;
                    debug!("첫 응답 타임아웃, 요청 재전송 (남은 재시도 {})", retries_left);
                    self.resend_last().await?;
                }
            }
        }
    }

    /// 수신측 락스텝 루프: DATA(N) 수신 -> 싱크 기록 -> ACK(N)
    ///
    /// `pending`은 핸드쉐이크 중에 이미 도착한 첫 DATA 블록.
    /// 블록 크기 미만의 페이로드가 전송 종료를 알린다.
    pub async fn receive_data<W: Write>(
        &mut self,
        sink: &mut W,
        mut pending: Option<(u16, Bytes)>,
    ) -> Result<()> {
        self.state = TransferState::Transferring;
        let mut expected: u16 = 1;
        let mut retries_left = self.retries;

        loop {
            let incoming = match pending.take() {
                Some((block, payload)) => Incoming::Packet(Packet::Data { block, payload }),
                None => self.recv_attempt().await?,
            };

            match incoming {
                Incoming::Packet(Packet::Data { block, payload }) if block == expected => {
                    if let Err(e) = sink.write_all(&payload) {
                        self.send_error(ErrorCode::DiskFull, "write failed").await;
                        self.state = TransferState::Errored;
                        self.stats.finish();
                        return Err(e.into());
                    }
                    self.stats.record_block(payload.len());
                    let is_final = payload.len() < self.block_size;
                    self.send_packet(&Packet::Ack { block }).await?;
                    expected = expected.wrapping_add(1);
                    retries_left = self.retries;
                    if is_final {
                        self.state = TransferState::Complete;
                        self.stats.finish();
                        return Ok(());
                    }
                }
                Incoming::Packet(Packet::Data { block, .. })
                    if block == expected.wrapping_sub(1) =>
                {
                    // 직전 블록의 재전송: ACK만 다시 보내고 싱크에는 쓰지 않는다
                    debug!("중복 DATA({}) 수신, ACK 재전송", block);
                    self.stats.record_duplicate();
                    self.resend_last().await?;
                }
                Incoming::Packet(Packet::Data { block, .. }) => {
                    // 락스텝에서 나올 수 없는 블록 번호는 조용히 폐기
                    debug!("순서 밖 DATA({}) 폐기 (기대 {})", block, expected);
                }
                Incoming::Packet(Packet::Error { code, message }) => {
                    self.state = TransferState::Errored;
                    self.stats.finish();
                    return Err(Error::Peer { code, message });
                }
                Incoming::Packet(other) => {
                    warn!("예상 밖 {} 패킷 무시", other.opcode().name());
                }
                Incoming::Bad | Incoming::TimedOut => {
                    if retries_left == 0 {
                        self.state = TransferState::Errored;
                        self.stats.finish();
                        return Err(Error::Timeout {
                            last_block: expected.wrapping_sub(1),
                            retries: self.retries,
                        });
                    }
                    retries_left -= 1;
                    self.resend_last().await?;
                }
            }
        }
    }

    /// 송신측 락스텝 루프: DATA(N) 송신 -> ACK(N) 대기
    ///
    /// 소스 크기가 블록 크기의 정확한 배수면 길이 0의 마지막
    /// 블록으로 종료를 알린다.
    pub async fn send_data<R: Read>(&mut self, source: &mut R) -> Result<()> {
        self.state = TransferState::Transferring;
        let mut block: u16 = 1;

        loop {
            let payload = read_block(source, self.block_size)?;
            let payload_len = payload.len();
            let is_final = payload_len < self.block_size;

            self.send_packet(&Packet::Data {
                block,
                payload: Bytes::from(payload),
            })
            .await?;
            self.await_ack(block).await?;
            self.stats.record_block(payload_len);

            if is_final {
                self.state = TransferState::Complete;
                self.stats.finish();
                return Ok(());
            }
            block = block.wrapping_add(1);
        }
    }

    /// ACK(block) 대기. 이전 블록의 늦은 ACK은 무시한다.
    pub async fn await_ack(&mut self, block: u16) -> Result<()> {
        let mut retries_left = self.retries;
        loop {
            match self.recv_attempt().await? {
                Incoming::Packet(Packet::Ack { block: acked }) if acked == block => {
                    return Ok(());
                }
                Incoming::Packet(Packet::Ack { block: acked }) => {
                    debug!("늦은 ACK({}) 무시 (기대 {})", acked, block);
                    self.stats.record_duplicate();
                }
                Incoming::Packet(Packet::Error { code, message }) => {
                    self.state = TransferState::Errored;
                    self.stats.finish();
                    return Err(Error::Peer { code, message });
                }
                Incoming::Packet(other) => {
                    warn!("예상 밖 {} 패킷 무시", other.opcode().name());
                }
                Incoming::Bad | Incoming::TimedOut => {
                    if retries_left == 0 {
                        self.state = TransferState::Errored;
                        self.stats.finish();
                        return Err(Error::Timeout {
                            last_block: block,
                            retries: self.retries,
                        });
                    }
                    retries_left -= 1;
                    self.resend_last().await?;
                }
            }
        }
    }
}

/// 소스에서 블록 하나를 채워 읽는다. EOF면 짧은(또는 빈) 블록.
fn read_block<R: Read>(source: &mut R, block_size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; block_size];
    let mut filled = 0;
    while filled < block_size {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_block_full_and_short() {
        let mut source = Cursor::new(vec![1u8; 700]);
        let first = read_block(&mut source, 512).unwrap();
        assert_eq!(first.len(), 512);
        let second = read_block(&mut source, 512).unwrap();
        assert_eq!(second.len(), 188);
        let third = read_block(&mut source, 512).unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn test_read_block_exact_multiple_then_empty() {
        let mut source = Cursor::new(vec![9u8; 1024]);
        assert_eq!(read_block(&mut source, 512).unwrap().len(), 512);
        assert_eq!(read_block(&mut source, 512).unwrap().len(), 512);
        // 정확한 배수면 다음 읽기가 빈 종료 블록이 된다
        assert!(read_block(&mut source, 512).unwrap().is_empty());
    }
}
