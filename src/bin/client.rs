//! RTFTP 클라이언트 - 락스텝 TFTP 클라이언트
//!
//! 서버에서 파일을 받거나(get) 서버로 올린다(put).
//!
//! 사용법:
//!   cargo run --release --bin rtftp-client -- [OPTIONS]
//!
//! 예시:
//!   # 다운로드
//!   cargo run --release --bin rtftp-client -- -s 127.0.0.1:6969 --get kernel.img -o kernel.img
//!
//!   # 업로드, 블록 크기 협상
//!   cargo run --release --bin rtftp-client -- -s 127.0.0.1:6969 --put data.bin --blksize 8192

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rtftp::{Config, TftpClient};

enum Operation {
    Get(String),
    Put(String),
}

/// 클라이언트 설정
struct ClientArgs {
    server_addr: SocketAddr,
    operation: Option<Operation>,
    local_path: Option<PathBuf>,
    config: Config,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6969".parse().unwrap(),
            operation: None,
            local_path: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    parsed.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--get" | "-g" => {
                if i + 1 < args.len() {
                    parsed.operation = Some(Operation::Get(args[i + 1].clone()));
                    i += 1;
                }
            }
            "--put" | "-p" => {
                if i + 1 < args.len() {
                    parsed.operation = Some(Operation::Put(args[i + 1].clone()));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    parsed.local_path = Some(PathBuf::from(&args[i + 1]));
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
                    parsed.config.negotiate_timeout = true;
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
                    r#"RTFTP Client - 락스텝 TFTP 클라이언트

RFC 1350 + 2347~2349 기반 TFTP 클라이언트
- blksize/timeout/tsize 옵션 협상
- 타임아웃 시 마지막 패킷 재전송

사용법:
  cargo run --release --bin rtftp-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>   서버 주소 (기본: 127.0.0.1:6969)
  -g, --get <FILE>      서버에서 받을 원격 파일명
  -p, --put <FILE>      서버로 올릴 로컬 파일 경로
  -o, --output <PATH>   저장/원격 경로 (기본: 파일명 그대로)
  --blksize <SIZE>      요청 블록 크기 (기본: 512 = 옵션 없음)
  --timeout <SECS>      수신 타임아웃 초, timeout 옵션도 협상 (기본: 5)
  --retries <N>         재시도 횟수 (기본: 5)
  -h, --help            이 도움말 출력

예시:
  # 다운로드
  cargo run --release --bin rtftp-client -- -s 10.0.0.1:69 -g boot.img -o ./boot.img

  # 큰 블록으로 업로드
  cargo run --release --bin rtftp-client -- -g big.iso --blksize 8192
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
    let operation = match args.operation {
        Some(op) => op,
        None => {
            eprintln!("--get 또는 --put이 필요합니다 (--help 참고)");
            std::process::exit(1);
        }
    };

    let client = TftpClient::new(args.server_addr, args.config);

    let stats = match operation {
        Operation::Get(remote) => {
            let local = args
                .local_path
                .unwrap_or_else(|| PathBuf::from(remote.as_str()));
            info!("GET {} -> {:?}", remote, local);
            let mut sink = File::create(&local)?;
            client.download(&remote, &mut sink).await?
        }
        Operation::Put(local) => {
            let local = PathBuf::from(local);
            let remote = match &args.local_path {
                Some(path) => path.to_string_lossy().into_owned(),
                None => local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| local.to_string_lossy().into_owned()),
            };
            info!("PUT {:?} -> {}", local, remote);
            let mut source = File::open(&local)?;
            client.upload(&remote, &mut source).await?
        }
    };

    println!("{}", stats.summary());
    Ok(())
}
