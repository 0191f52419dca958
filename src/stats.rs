//! 전송 통계

use std::time::{Duration, Instant};

/// 단일 전송의 통계
///
/// TransferContext가 단독 소유하며 전역 상태가 없다.
/// 전송이 끝나면 경과 시간이 고정된 스냅샷으로 호출자에게 돌아간다.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 첫 패킷 송신 시각
    start_time: Instant,

    /// 종료 시점에 고정된 경과 시간
    finished: Option<Duration>,

    /// 전송/수신한 페이로드 바이트 (재전송 제외)
    pub bytes_transferred: u64,

    /// 처리한 블록 수 (종료용 빈 블록 포함)
    pub blocks_transferred: u64,

    /// 로컬에서 재전송한 패킷 수
    pub retransmissions: u64,

    /// 재전송으로 나간 바이트
    pub resent_bytes: u64,

    /// 수신한 중복 패킷 수 (중복 DATA, 늦은 ACK)
    pub duplicates_received: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            finished: None,
            bytes_transferred: 0,
            blocks_transferred: 0,
            retransmissions: 0,
            resent_bytes: 0,
            duplicates_received: 0,
        }
    }

    /// 시작 시각을 지금으로 재설정 (첫 패킷 송신 직전에 호출)
    pub(crate) fn restart(&mut self) {
        self.start_time = Instant::now();
    }

    pub(crate) fn record_block(&mut self, payload_len: usize) {
        self.bytes_transferred += payload_len as u64;
        self.blocks_transferred += 1;
    }

    pub(crate) fn record_retransmission(&mut self, packet_len: usize) {
        self.retransmissions += 1;
        self.resent_bytes += packet_len as u64;
    }

    pub(crate) fn record_duplicate(&mut self) {
        self.duplicates_received += 1;
    }

    /// 경과 시간을 고정한다. 이미 고정됐으면 무시.
    pub(crate) fn finish(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(self.start_time.elapsed());
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(|| self.start_time.elapsed())
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Blocks: {} | Throughput: {:.2} MB/s | Retransmits: {} | Duplicates: {}",
            self.elapsed().as_secs_f64(),
            self.bytes_transferred,
            self.blocks_transferred,
            self.throughput() / 1_000_000.0,
            self.retransmissions,
            self.duplicates_received,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
