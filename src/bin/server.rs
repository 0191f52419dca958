//! RTFTP 서버 - 락스텝 TFTP 서버
//!
//! 루트 디렉터리 하나를 RRQ/WRQ로 서비스한다.
//!
//! 사용법:
//!   cargo run --release --bin rtftp-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(6969)로 ./tftp_root 서비스
//!   cargo run --release --bin rtftp-server -- --root ./tftp_root
//!
//!   # 표준 포트 69 (권한 필요)
//!   cargo run --release --bin rtftp-server -- -b 0.0.0.0:69 -r /srv/tftp

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rtftp::{Config, TftpServer};

/// 서버 설정
struct ServerArgs {
    bind_addr: SocketAddr,
    root: PathBuf,
    config: Config,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6969".parse().unwrap(),
            root: PathBuf::from("./tftp_root"),
            config: Config::lan(),
        }
    }
}

fn parse_args() -> ServerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--root" | "-r" => {
                if i + 1 < args.len() {
                    parsed.root = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--blksize" => {
                if i + 1 < args.len() {
                    parsed.config.block_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("유효한 숫자 필요");
                    parsed.config.timeout = std::time::Duration::from_secs(secs);
                    i += 1;
                }
            }
            "--retries" => {
                if i + 1 < args.len() {
                    parsed.config.retries = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"RTFTP Server - 락스텝 TFTP 서버

RFC 1350 + 2347~2349 기반 TFTP 서버
- 루트 디렉터리 하나를 RRQ/WRQ로 서비스
- blksize/timeout/tsize 옵션 협상
- 전송마다 독립 TID 소켓

사용법:
  cargo run --release --bin rtftp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>    바인드 주소 (기본: 0.0.0.0:6969)
  -r, --root <PATH>    서비스할 루트 디렉터리 (기본: ./tftp_root)
  --blksize <SIZE>     허용 최대 블록 크기 (기본: 8192)
  --timeout <SECS>     수신 타임아웃 초 (기본: 1)
  --retries <N>        재시도 횟수 (기본: 3)
  -h, --help           이 도움말 출력

예시:
  # 기본 설정으로 시작
  cargo run --release --bin rtftp-server -- -r ./files

  # 표준 포트 69 (권한 필요)
  cargo run --release --bin rtftp-server -- -b 0.0.0.0:69 -r /srv/tftp
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    info!("RTFTP Server starting...");
    info!("Bind address: {}", args.bind_addr);
    info!("Root directory: {:?}", args.root);
    info!("Max block size: {} bytes", args.config.block_size);

    if !args.root.is_dir() {
        return Err(format!("루트 디렉터리 없음: {:?}", args.root).into());
    }

    let server = TftpServer::bind(args.bind_addr, args.root, args.config).await?;
    server.serve().await?;
    Ok(())
}
