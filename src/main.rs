mod cache;
mod config;
mod engine;
mod proto_utils;
mod sweeper;
mod upstream;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::ResponseCache;
use crate::config::load_settings;
use crate::engine::Engine;
use crate::proto_utils::MAX_UDP_PAYLOAD;
use crate::upstream::Forwarder;

#[derive(Parser, Debug)]
#[command(author, version, about = "Caching DNS forwarder for a single upstream", long_about = None)]
struct Args {
    /// 配置文件路径（JSON，可选）
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// UDP 监听地址，覆盖配置文件
    #[arg(long = "bind")]
    bind: Option<String>,
    /// 上游 DNS 地址，覆盖配置文件
    #[arg(long = "upstream")]
    upstream: Option<String>,
    /// 上游超时（毫秒），0 表示不设超时
    #[arg(long = "upstream-timeout-ms")]
    upstream_timeout_ms: Option<u64>,
    /// 过期条目清理周期（秒），0 表示关闭
    #[arg(long = "sweep-interval-secs")]
    sweep_interval_secs: Option<u64>,
    /// 启用调试日志
    #[arg(long = "debug", default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let mut settings = load_settings(args.config.as_deref()).context("load config")?;
    if let Some(bind) = args.bind {
        settings.bind_udp = bind;
    }
    if let Some(upstream) = args.upstream {
        settings.upstream = upstream;
    }
    if let Some(ms) = args.upstream_timeout_ms {
        settings.upstream_timeout_ms = ms;
    }
    if let Some(secs) = args.sweep_interval_secs {
        settings.cache_sweep_secs = secs;
    }

    let bind_addr = settings.bind_addr()?;
    let upstream_addr = settings.upstream_addr()?;

    let engine = Engine::new(
        Arc::new(ResponseCache::new()),
        Forwarder::new(upstream_addr, settings.upstream_timeout()),
    );

    if let Some(every) = settings.sweep_interval() {
        sweeper::spawn(Arc::clone(engine.cache()), every);
    }

    let std_socket = create_udp_socket(bind_addr).context("bind udp listener")?;
    let socket = Arc::new(UdpSocket::from_std(std_socket).context("from_std")?);

    info!(bind_udp = %bind_addr, upstream = %upstream_addr, "dns resolver started");

    run_udp(socket, engine).await
}

fn init_tracing(debug: bool) {
    let fmt_layer = fmt::layer().with_target(false).with_ansi(false);

    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn create_udp_socket(addr: SocketAddr) -> anyhow::Result<std::net::UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(4 * 1024 * 1024) {
        warn!("failed to set udp recv buffer size: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(4 * 1024 * 1024) {
        warn!("failed to set udp send buffer size: {}", e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// 接收循环：每个数据报一个任务，不设并发上限
async fn run_udp(socket: Arc<UdpSocket>, engine: Engine) -> anyhow::Result<()> {
    let mut buf = [0u8; MAX_UDP_PAYLOAD];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(err) => {
                // 继续接收，不退出
                warn!(error = %err, "udp read error");
                continue;
            }
        };
        let packet = buf[..len].to_vec();
        let engine = engine.clone();
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            engine.serve(&socket, &packet, peer).await;
        });
    }
}
