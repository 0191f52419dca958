//! 클라이언트 세션 드라이버
//!
//! 전송마다 임시 UDP 포트를 새로 열고 (그 포트가 이 세션의 TID),
//! 전송이 끝나면 소켓은 어느 경로로 빠져나가든 드롭으로 해제된다.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::{self, TransferOptions};
use crate::packet::{ErrorCode, Mode, Packet};
use crate::stats::TransferStats;
use crate::transfer::TransferContext;

/// TFTP 클라이언트
///
/// 호출 간에 상태를 공유하지 않으므로 하나로 여러 전송을 순차
/// 수행해도 된다. 전송은 모두 octet 모드로 요청한다.
pub struct TftpClient {
    server_addr: SocketAddr,
    config: Config,
    abort: Arc<AtomicBool>,
}

impl TftpClient {
    pub fn new(server_addr: SocketAddr, config: Config) -> Self {
        Self {
            server_addr,
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 진행 중인 전송을 중단시키는 플래그. true로 바꾸면 다음 수신
    /// 시도에서 `Error::Cancelled`로 끝난다.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// 파일 다운로드 (RRQ). 완료 시 전송 통계를 돌려준다.
    pub async fn download<W: Write>(&self, filename: &str, sink: &mut W) -> Result<TransferStats> {
        let mut ctx = self.open_context().await?;
        let requested = self.requested_options(true);
        let rrq = Packet::Rrq {
            filename: filename.to_string(),
            mode: Mode::Octet,
            options: requested.to_request_pairs(),
        };
        ctx.send_packet(&rrq).await?;
        info!("RRQ {} -> {}", filename, self.server_addr);

        match ctx.await_first_reply().await? {
            Packet::Oack { options } => {
                let accepted = match options::accept_oack(&requested, &options) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        ctx.send_error(ErrorCode::OptionNegotiation, "unacceptable option value")
                            .await;
                        return Err(e);
                    }
                };
                debug!("OACK 수락: blksize={}", accepted.block_size);
                if let Some(size) = accepted.transfer_size {
                    debug!("서버가 보고한 tsize: {}", size);
                }
                ctx.apply_options(&accepted);
                ctx.send_packet(&Packet::Ack { block: 0 }).await?;
                ctx.receive_data(sink, None).await?;
            }
            Packet::Data { block, payload } => {
                // OACK 없이 바로 데이터: 옵션은 협상되지 않았고 기본
                // 블록 크기 512로 진행한다
                ctx.receive_data(sink, Some((block, payload))).await?;
            }
            Packet::Error { code, message } => {
                return Err(Error::Peer { code, message });
            }
            other => {
                warn!("RRQ 응답으로 {} 수신", other.opcode().name());
                ctx.send_error(ErrorCode::IllegalOperation, "unexpected reply to RRQ")
                    .await;
                return Err(Error::MalformedPacket {
                    reason: "RRQ 응답으로 올 수 없는 패킷",
                });
            }
        }

        let stats = ctx.into_stats();
        info!("다운로드 완료: {}", stats.summary());
        Ok(stats)
    }

    /// 파일 업로드 (WRQ). 완료 시 전송 통계를 돌려준다.
    pub async fn upload<R: Read>(&self, filename: &str, source: &mut R) -> Result<TransferStats> {
        let mut ctx = self.open_context().await?;
        let requested = self.requested_options(false);
        let wrq = Packet::Wrq {
            filename: filename.to_string(),
            mode: Mode::Octet,
            options: requested.to_request_pairs(),
        };
        ctx.send_packet(&wrq).await?;
        info!("WRQ {} -> {}", filename, self.server_addr);

        match ctx.await_first_reply().await? {
            Packet::Oack { options } => {
                let accepted = match options::accept_oack(&requested, &options) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        ctx.send_error(ErrorCode::OptionNegotiation, "unacceptable option value")
                            .await;
                        return Err(e);
                    }
                };
                ctx.apply_options(&accepted);
                // OACK 뒤에는 ACK(0) 없이 바로 DATA(1)을 보낸다
                ctx.send_data(source).await?;
            }
            Packet::Ack { block: 0 } => {
                ctx.send_data(source).await?;
            }
            Packet::Ack { block } => {
                warn!("WRQ 응답 ACK의 블록 번호가 {} (0이어야 함)", block);
                ctx.send_error(ErrorCode::IllegalOperation, "unexpected ack block")
                    .await;
                return Err(Error::MalformedPacket {
                    reason: "WRQ 응답 ACK의 블록 번호가 0이 아님",
                });
            }
            Packet::Error { code, message } => {
                return Err(Error::Peer { code, message });
            }
            other => {
                warn!("WRQ 응답으로 {} 수신", other.opcode().name());
                ctx.send_error(ErrorCode::IllegalOperation, "unexpected reply to WRQ")
                    .await;
                return Err(Error::MalformedPacket {
                    reason: "WRQ 응답으로 올 수 없는 패킷",
                });
            }
        }

        let stats = ctx.into_stats();
        info!("업로드 완료: {}", stats.summary());
        Ok(stats)
    }

    async fn open_context(&self) -> Result<TransferContext> {
        self.config.validate()?;
        let bind_addr = match self.server_addr {
            SocketAddr::V4(_) => "0.0.0.0:0",
            SocketAddr::V6(_) => "[::]:0",
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        debug!("로컬 TID {} 바인딩", socket.local_addr()?.port());
        Ok(TransferContext::new(
            socket,
            self.server_addr,
            &self.config,
            self.abort.clone(),
        ))
    }

    fn requested_options(&self, is_download: bool) -> TransferOptions {
        TransferOptions {
            block_size: self.config.block_size,
            timeout_secs: if self.config.negotiate_timeout {
                Some(self.config.wire_timeout_secs())
            } else {
                None
            },
            // 업로드는 일반 Read 소스라 크기를 모를 수 있으므로
            // tsize는 다운로드에서만 묻는다
            transfer_size: if is_download && self.config.request_tsize {
                Some(0)
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            timeout: Duration::from_millis(200),
            retries: 2,
            request_tsize: false,
            ..Default::default()
        }
    }

    async fn scripted_server() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_packet(socket: &UdpSocket, buf: &mut [u8]) -> (Packet, SocketAddr) {
        let (len, src) = socket.recv_from(buf).await.unwrap();
        (Packet::decode(&buf[..len]).unwrap(), src)
    }

    #[tokio::test]
    async fn test_download_1025_bytes_three_blocks() {
        let (server, addr) = scripted_server().await;
        let file: Vec<u8> = (0..1025u32).map(|i| (i % 251) as u8).collect();
        let expected = file.clone();

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (request, client) = recv_packet(&server, &mut buf).await;
            assert!(matches!(request, Packet::Rrq { .. }));

            let mut acks = 0u32;
            for (i, chunk) in file.chunks(512).enumerate() {
                let data = Packet::Data {
                    block: (i + 1) as u16,
                    payload: Bytes::copy_from_slice(chunk),
                };
                server.send_to(&data.encode(), client).await.unwrap();
                let (reply, _) = recv_packet(&server, &mut buf).await;
                match reply {
                    Packet::Ack { block } => {
                        assert_eq!(block, (i + 1) as u16);
                        acks += 1;
                    }
                    other => panic!("expected ACK, got {:?}", other),
                }
            }
            acks
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("data.bin", &mut sink).await.unwrap();

        assert_eq!(sink, expected);
        assert_eq!(stats.bytes_transferred, 1025);
        assert_eq!(stats.blocks_transferred, 3);
        assert_eq!(peer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_download_duplicate_data_not_rewritten() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            let block1 = Packet::Data {
                block: 1,
                payload: Bytes::from(vec![7u8; 512]),
            };
            server.send_to(&block1.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));

            // ACK를 못 받은 척 블록 1을 다시 보낸다
            server.send_to(&block1.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));

            let block2 = Packet::Data {
                block: 2,
                payload: Bytes::from(vec![8u8; 10]),
            };
            server.send_to(&block2.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 2 }));
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("dup.bin", &mut sink).await.unwrap();

        // 중복 블록은 한 번만 기록된다
        assert_eq!(sink.len(), 522);
        assert_eq!(stats.bytes_transferred, 522);
        assert_eq!(stats.duplicates_received, 1);
        assert_eq!(stats.retransmissions, 1);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_download_exact_multiple_ends_with_empty_block() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            for (block, len) in [(1u16, 512usize), (2, 512), (3, 0)] {
                let data = Packet::Data {
                    block,
                    payload: Bytes::from(vec![3u8; len]),
                };
                server.send_to(&data.encode(), client).await.unwrap();
                let (reply, _) = recv_packet(&server, &mut buf).await;
                assert!(matches!(reply, Packet::Ack { block: b } if b == block));
            }
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("exact.bin", &mut sink).await.unwrap();

        assert_eq!(sink.len(), 1024);
        assert_eq!(stats.blocks_transferred, 3);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_download_one_byte_short_of_multiple() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            // 1023바이트: 512 + 511, 빈 블록 불필요
            for (block, len) in [(1u16, 512usize), (2, 511)] {
                let data = Packet::Data {
                    block,
                    payload: Bytes::from(vec![4u8; len]),
                };
                server.send_to(&data.encode(), client).await.unwrap();
                let (reply, _) = recv_packet(&server, &mut buf).await;
                assert!(matches!(reply, Packet::Ack { block: b } if b == block));
            }
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("short.bin", &mut sink).await.unwrap();

        assert_eq!(sink.len(), 1023);
        assert_eq!(stats.blocks_transferred, 2);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_exhaustion_sends_four_requests() {
        let (server, addr) = scripted_server().await;

        // 응답하지 않고 RRQ 수신 횟수만 센다
        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let mut count = 0u32;
            while let Ok(result) =
                tokio::time::timeout(Duration::from_millis(500), server.recv_from(&mut buf)).await
            {
                result.unwrap();
                count += 1;
            }
            count
        });

        let config = Config {
            timeout: Duration::from_millis(100),
            retries: 3,
            request_tsize: false,
            ..Default::default()
        };
        let client = TftpClient::new(addr, config);
        let mut sink = Vec::new();
        let result = client.download("void.bin", &mut sink).await;

        assert!(matches!(
            result,
            Err(Error::Timeout {
                last_block: 0,
                retries: 3
            })
        ));
        // 최초 1회 + 재시도 3회
        assert_eq!(peer.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_server_error_reply_is_fatal() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;
            let err = Packet::Error {
                code: ErrorCode::FileNotFound,
                message: "File not found".to_string(),
            };
            server.send_to(&err.encode(), client).await.unwrap();
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let result = client.download("missing.bin", &mut sink).await;

        assert!(matches!(
            result,
            Err(Error::Peer {
                code: ErrorCode::FileNotFound,
                ..
            })
        ));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_download_with_oack_blocksize() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (request, client) = recv_packet(&server, &mut buf).await;
            match request {
                Packet::Rrq { options, .. } => {
                    assert!(options.contains(&("blksize".to_string(), "1024".to_string())));
                }
                other => panic!("expected RRQ, got {:?}", other),
            }

            let oack = Packet::Oack {
                options: vec![("blksize".to_string(), "1024".to_string())],
            };
            server.send_to(&oack.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 0 }));

            // 1024 미만의 단일 블록으로 종료
            let data = Packet::Data {
                block: 1,
                payload: Bytes::from(vec![5u8; 700]),
            };
            server.send_to(&data.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));
        });

        let config = Config {
            block_size: 1024,
            ..test_config()
        };
        let client = TftpClient::new(addr, config);
        let mut sink = Vec::new();
        let stats = client.download("oack.bin", &mut sink).await.unwrap();

        assert_eq!(sink.len(), 700);
        assert_eq!(stats.blocks_transferred, 1);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_oack_raised_blocksize_rejected_with_error8() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            let oack = Packet::Oack {
                options: vec![("blksize".to_string(), "2048".to_string())],
            };
            server.send_to(&oack.encode(), client).await.unwrap();

            let (reply, _) = recv_packet(&server, &mut buf).await;
            match reply {
                Packet::Error { code, .. } => assert_eq!(code, ErrorCode::OptionNegotiation),
                other => panic!("expected ERROR(8), got {:?}", other),
            }
        });

        let config = Config {
            block_size: 1024,
            ..test_config()
        };
        let client = TftpClient::new(addr, config);
        let mut sink = Vec::new();
        let result = client.download("bad-oack.bin", &mut sink).await;

        assert!(matches!(result, Err(Error::InvalidOption { .. })));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_exact_multiple_sends_empty_final_block() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (request, client) = recv_packet(&server, &mut buf).await;
            assert!(matches!(request, Packet::Wrq { .. }));
            server
                .send_to(&Packet::Ack { block: 0 }.encode(), client)
                .await
                .unwrap();

            let mut received = Vec::new();
            let mut lengths = Vec::new();
            loop {
                let (packet, _) = recv_packet(&server, &mut buf).await;
                match packet {
                    Packet::Data { block, payload } => {
                        lengths.push(payload.len());
                        received.extend_from_slice(&payload);
                        server
                            .send_to(&Packet::Ack { block }.encode(), client)
                            .await
                            .unwrap();
                        if payload.len() < 512 {
                            break;
                        }
                    }
                    other => panic!("expected DATA, got {:?}", other),
                }
            }
            (received, lengths)
        });

        let client = TftpClient::new(addr, test_config());
        let data = vec![6u8; 1024];
        let mut source = Cursor::new(data.clone());
        let stats = client.upload("up.bin", &mut source).await.unwrap();

        let (received, lengths) = peer.await.unwrap();
        assert_eq!(received, data);
        // 정확한 배수이므로 마지막에 빈 블록이 나간다
        assert_eq!(lengths, vec![512, 512, 0]);
        assert_eq!(stats.bytes_transferred, 1024);
        assert_eq!(stats.blocks_transferred, 3);
    }

    #[tokio::test]
    async fn test_upload_ignores_stale_ack() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;
            server
                .send_to(&Packet::Ack { block: 0 }.encode(), client)
                .await
                .unwrap();

            let (packet, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(packet, Packet::Data { block: 1, .. }));
            // 늦은 ACK(0)을 먼저 흘린 뒤 제대로 된 ACK(1)
            server
                .send_to(&Packet::Ack { block: 0 }.encode(), client)
                .await
                .unwrap();
            server
                .send_to(&Packet::Ack { block: 1 }.encode(), client)
                .await
                .unwrap();

            let (packet, _) = recv_packet(&server, &mut buf).await;
            match packet {
                Packet::Data { block: 2, payload } => assert_eq!(payload.len(), 100),
                other => panic!("expected DATA(2), got {:?}", other),
            }
            server
                .send_to(&Packet::Ack { block: 2 }.encode(), client)
                .await
                .unwrap();
        });

        let client = TftpClient::new(addr, test_config());
        let mut source = Cursor::new(vec![1u8; 612]);
        let stats = client.upload("stale.bin", &mut source).await.unwrap();

        assert_eq!(stats.bytes_transferred, 612);
        assert_eq!(stats.duplicates_received, 1);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_datagram_mid_transfer_resends_last_ack() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            let block1 = Packet::Data {
                block: 1,
                payload: Bytes::from(vec![7u8; 512]),
            };
            server.send_to(&block1.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));

            // 디코드 불가 데이터그램 주입: 타임아웃처럼 ACK(1)이 재전송돼야 한다
            server.send_to(&[0xFF, 0xFF, 0x00], client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));

            let block2 = Packet::Data {
                block: 2,
                payload: Bytes::from(vec![8u8; 10]),
            };
            server.send_to(&block2.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 2 }));
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("garbage.bin", &mut sink).await.unwrap();

        // 깨진 데이터그램은 재시도 예산만 쓰고 전송은 계속된다
        assert_eq!(sink.len(), 522);
        assert_eq!(stats.bytes_transferred, 522);
        assert_eq!(stats.retransmissions, 1);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_tid_receives_error5_and_is_ignored() {
        let (server, addr) = scripted_server().await;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (_, client) = recv_packet(&server, &mut buf).await;

            let block1 = Packet::Data {
                block: 1,
                payload: Bytes::from(vec![7u8; 512]),
            };
            server.send_to(&block1.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 1 }));

            // 다른 포트(다른 TID)에서 DATA(2)를 끼워 넣는다
            let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let fake = Packet::Data {
                block: 2,
                payload: Bytes::from(vec![9u8; 512]),
            };
            intruder.send_to(&fake.encode(), client).await.unwrap();

            // 침입자는 ERROR(5)를 받아야 한다
            let (len, _) = intruder.recv_from(&mut buf).await.unwrap();
            match Packet::decode(&buf[..len]).unwrap() {
                Packet::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownTransferId),
                other => panic!("expected ERROR(5), got {:?}", other),
            }

            // 진짜 전송은 그대로 이어진다
            let block2 = Packet::Data {
                block: 2,
                payload: Bytes::from(vec![8u8; 10]),
            };
            server.send_to(&block2.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 2 }));
        });

        let client = TftpClient::new(addr, test_config());
        let mut sink = Vec::new();
        let stats = client.download("intrude.bin", &mut sink).await.unwrap();

        // 침입 데이터그램은 재시도 예산도, 싱크도 건드리지 않는다
        assert_eq!(sink.len(), 522);
        assert_eq!(stats.retransmissions, 0);
        assert_eq!(stats.blocks_transferred, 2);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_block_number_wraps_past_65535() {
        let (server, addr) = scripted_server().await;

        // blksize 8로 65536 전체 블록 + 4바이트: 블록 번호가
        // 65535 -> 0 -> 1로 넘어간다
        let total: usize = 65536 * 8 + 4;

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let (_, client) = recv_packet(&server, &mut buf).await;

            let oack = Packet::Oack {
                options: vec![("blksize".to_string(), "8".to_string())],
            };
            server.send_to(&oack.encode(), client).await.unwrap();
            let (reply, _) = recv_packet(&server, &mut buf).await;
            assert!(matches!(reply, Packet::Ack { block: 0 }));

            let mut sent = 0usize;
            let mut block: u16 = 1;
            let mut wrapped = false;
            while sent < total {
                let len = (total - sent).min(8);
                let data = Packet::Data {
                    block,
                    payload: Bytes::from(vec![0xA5u8; len]),
                };
                server.send_to(&data.encode(), client).await.unwrap();
                let (reply, _) = recv_packet(&server, &mut buf).await;
                assert!(matches!(reply, Packet::Ack { block: b } if b == block));
                if block == 0 {
                    wrapped = true;
                }
                sent += len;
                block = block.wrapping_add(1);
            }
            assert!(wrapped);
        });

        let config = Config {
            block_size: 8,
            ..test_config()
        };
        let client = TftpClient::new(addr, config);
        let mut sink = Vec::new();
        let stats = client.download("wrap.bin", &mut sink).await.unwrap();

        assert_eq!(sink.len(), total);
        assert_eq!(stats.blocks_transferred, 65537);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_flag_cancels_transfer() {
        let (_server, addr) = scripted_server().await;

        let client = TftpClient::new(addr, test_config());
        client.abort_handle().store(true, Ordering::Relaxed);

        let mut sink = Vec::new();
        let result = client.download("abort.bin", &mut sink).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
