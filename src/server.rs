//! 서버 세션 드라이버
//!
//! 메인 소켓은 RRQ/WRQ 접수만 하고, 전송은 각자 임시 소켓(TID)을
//! 가진 독립 태스크에서 진행한다. 루트 디렉터리 밖으로 나가는
//! 경로는 canonicalize 검사로 거부한다.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::options;
use crate::packet::{ErrorCode, Packet};
use crate::stats::TransferStats;
use crate::transfer::TransferContext;

/// 서버 누적 통계
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// TFTP 서버
pub struct TftpServer {
    socket: UdpSocket,
    root: PathBuf,
    config: Config,
    /// 진행 중인 클라이언트 TID 집합. 같은 TID의 중복 요청은 무시한다.
    active: Arc<DashMap<SocketAddr, ()>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl TftpServer {
    pub async fn bind(
        bind_addr: SocketAddr,
        root: impl Into<PathBuf>,
        config: Config,
    ) -> Result<TftpServer> {
        config.validate()?;
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("TFTP 서버 시작: {}", socket.local_addr()?);
        Ok(Self {
            socket,
            root: root.into(),
            config,
            active: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }

    /// 요청 접수 루프. 소켓 에러가 아니면 돌아오지 않는다.
    pub async fn serve(&self) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size.max(crate::MAX_PACKET_SIZE)];
        loop {
            let (len, client) = self.socket.recv_from(&mut buf).await?;
            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("{}: 디코드 불가 요청 ({})", client, e);
                    self.reject(client, ErrorCode::IllegalOperation, "malformed request")
                        .await;
                    continue;
                }
            };

            if self.active.contains_key(&client) {
                // 활성 세션의 재전송된 요청: 전송 태스크가 이미 응답 중
                debug!("{}: 활성 세션의 중복 요청 무시", client);
                continue;
            }

            match packet {
                Packet::Rrq {
                    filename,
                    mode,
                    options,
                } => {
                    debug!("{}: RRQ {} ({})", client, filename, mode);
                    self.spawn_transfer(client, filename, options, Direction::Read);
                }
                Packet::Wrq {
                    filename,
                    mode,
                    options,
                } => {
                    debug!("{}: WRQ {} ({})", client, filename, mode);
                    self.spawn_transfer(client, filename, options, Direction::Write);
                }
                other => {
                    warn!("{}: 요청이 아닌 {} 패킷", client, other.opcode().name());
                    self.reject(client, ErrorCode::IllegalOperation, "expected RRQ or WRQ")
                        .await;
                }
            }
        }
    }

    async fn reject(&self, client: SocketAddr, code: ErrorCode, message: &str) {
        let packet = Packet::Error {
            code,
            message: message.to_string(),
        };
        let _ = self.socket.send_to(&packet.encode(), client).await;
    }

    fn spawn_transfer(
        &self,
        client: SocketAddr,
        filename: String,
        options: Vec<(String, String)>,
        direction: Direction,
    ) {
        let root = self.root.clone();
        let config = self.config.clone();
        let active = self.active.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            active.insert(client, ());
            let result = match direction {
                Direction::Read => serve_read(client, &root, &filename, &options, &config).await,
                Direction::Write => serve_write(client, &root, &filename, &options, &config).await,
            };
            active.remove(&client);

            let mut aggregate = stats.write();
            match result {
                Ok(transfer) => {
                    aggregate.transfers_completed += 1;
                    match direction {
                        Direction::Read => aggregate.bytes_sent += transfer.bytes_transferred,
                        Direction::Write => aggregate.bytes_received += transfer.bytes_transferred,
                    }
                    info!("{}: {} 완료 ({})", client, filename, transfer.summary());
                }
                Err(e) => {
                    aggregate.transfers_failed += 1;
                    warn!("{}: {} 실패: {}", client, filename, e);
                }
            }
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// RRQ 처리: 파일을 읽어 클라이언트로 보낸다
async fn serve_read(
    client: SocketAddr,
    root: &Path,
    filename: &str,
    options: &[(String, String)],
    config: &Config,
) -> Result<TransferStats> {
    let socket = ephemeral_socket(client).await?;

    let path = match resolve_path(root, filename) {
        Ok(path) => path,
        Err(e) => {
            send_error_to(&socket, client, ErrorCode::AccessViolation).await;
            return Err(e);
        }
    };

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                ErrorCode::FileNotFound
            } else {
                ErrorCode::AccessViolation
            };
            send_error_to(&socket, client, code).await;
            return Err(e.into());
        }
    };

    let mut ctx =
        TransferContext::new(socket, client, config, Arc::new(AtomicBool::new(false))).latched();

    if !options.is_empty() {
        match options::negotiate(options, config.block_size, Some(data.len() as u64)) {
            Ok((accepted, oack)) if !oack.is_empty() => {
                ctx.apply_options(&accepted);
                ctx.send_packet(&Packet::Oack { options: oack }).await?;
                ctx.await_ack(0).await?;
            }
            Ok(_) => {
                // 아는 옵션이 하나도 없으면 OACK 없이 바로 데이터
            }
            Err(e) => {
                ctx.send_error(ErrorCode::OptionNegotiation, "invalid option value")
                    .await;
                return Err(e);
            }
        }
    }

    let mut source = Cursor::new(data);
    ctx.send_data(&mut source).await?;
    Ok(ctx.into_stats())
}

/// WRQ 처리: 클라이언트가 보내는 파일을 받아 저장한다
async fn serve_write(
    client: SocketAddr,
    root: &Path,
    filename: &str,
    options: &[(String, String)],
    config: &Config,
) -> Result<TransferStats> {
    let socket = ephemeral_socket(client).await?;

    let path = match resolve_path(root, filename) {
        Ok(path) => path,
        Err(e) => {
            send_error_to(&socket, client, ErrorCode::AccessViolation).await;
            return Err(e);
        }
    };

    if path.exists() {
        send_error_to(&socket, client, ErrorCode::FileAlreadyExists).await;
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }

    let mut ctx =
        TransferContext::new(socket, client, config, Arc::new(AtomicBool::new(false))).latched();

    if !options.is_empty() {
        match options::negotiate(options, config.block_size, None) {
            Ok((accepted, oack)) if !oack.is_empty() => {
                ctx.apply_options(&accepted);
                ctx.send_packet(&Packet::Oack { options: oack }).await?;
            }
            Ok(_) => {
                ctx.send_packet(&Packet::Ack { block: 0 }).await?;
            }
            Err(e) => {
                ctx.send_error(ErrorCode::OptionNegotiation, "invalid option value")
                    .await;
                return Err(e);
            }
        }
    } else {
        ctx.send_packet(&Packet::Ack { block: 0 }).await?;
    }

    let mut sink = Vec::new();
    ctx.receive_data(&mut sink, None).await?;
    std::fs::write(&path, &sink)?;
    Ok(ctx.into_stats())
}

/// 클라이언트 주소 패밀리에 맞는 임시 TID 소켓
async fn ephemeral_socket(client: SocketAddr) -> Result<UdpSocket> {
    let bind_addr = match client {
        SocketAddr::V4(_) => "0.0.0.0:0",
        SocketAddr::V6(_) => "[::]:0",
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    debug!("전송 소켓 {} 바인딩", socket.local_addr()?);
    Ok(socket)
}

async fn send_error_to(socket: &UdpSocket, client: SocketAddr, code: ErrorCode) {
    let _ = socket
        .send_to(&Packet::error_from(code).encode(), client)
        .await;
}

/// 루트 밖으로 나가는 경로를 거부한다
///
/// 아직 없는 파일(WRQ)은 canonicalize가 실패하므로 부모 디렉터리
/// 기준으로 검사한다.
fn resolve_path(root: &Path, filename: &str) -> Result<PathBuf> {
    let denied = || {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "path escapes root directory",
        ))
    };

    let root = root.canonicalize()?;
    let requested = root.join(filename);

    let resolved = if requested.exists() {
        requested.canonicalize()?
    } else {
        let parent = requested.parent().ok_or_else(denied)?.canonicalize()?;
        parent.join(requested.file_name().ok_or_else(denied)?)
    };

    if !resolved.starts_with(&root) {
        return Err(denied());
    }
    Ok(resolved)
}
