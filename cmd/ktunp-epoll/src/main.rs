//! KTUNP epoll consumer
//!
//! Runs the pipeline on rtnetlink, opens both watches, registers them
//! edge-triggered and blocks with no timeout. On each wakeup the ready
//! watch is read (bounded) and the byte count printed.
//!
//! Usage:
//!     KTUNP_INETADDR=192.0.2.1 ./target/release/ktunp-epoll
//!
//! Control lines on stdin:
//!     inetaddr 192.0.2.1      set a target
//!     nexthop                 show a target
//!
//! Test with (another terminal):
//!     ip addr add 192.0.2.1/24 dev dummy0
//!     ip nexthop add id 7 dev dummy0 && ip nexthop del id 7

use ktunp_core::event::NetNsId;
use ktunp_core::watch::WatchKind;

use ktunp_module::config::PipelineConfig;
use ktunp_module::control::ControlPlane;
use ktunp_module::netlink_source::NetlinkSource;
use ktunp_module::pipeline::PipelineBuilder;
use ktunp_module::poller::WatchPoller;

use std::io::BufRead;
use std::process::ExitCode;
use std::thread;

use tracing::warn;

type BoxError = Box<dyn std::error::Error>;

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("KTUNP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// `<name> <literal>` stores, `<name>` shows.
fn spawn_control(control: ControlPlane) -> std::io::Result<()> {
    thread::Builder::new()
        .name("ktunp-control".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let mut parts = line.split_whitespace();
                let Some(name) = parts.next() else { continue };

                let known = match parts.next() {
                    Some(literal) => control.store(name, literal.as_bytes()).is_some(),
                    None => match control.show_line(name) {
                        Some(text) => {
                            print!("{}", text);
                            true
                        }
                        None => false,
                    },
                };
                if !known {
                    warn!(name, "unknown resource");
                }
            }
        })?;
    Ok(())
}

fn run() -> Result<(), BoxError> {
    let config = PipelineConfig::from_env();
    let source = NetlinkSource::new(NetNsId::CURRENT, config.poll_interval, config.recv_buffer);
    let pipeline = PipelineBuilder::new(config.clone()).build(&source, &source)?;

    // Indexed by WatchKind::index()
    let handles = [pipeline.open(WatchKind::NextHop)?, pipeline.open(WatchKind::InetAddr)?];

    let mut poller = WatchPoller::new(config.max_events)?;
    for handle in &handles {
        poller.register(handle)?;
    }

    spawn_control(pipeline.control())?;

    let mut data = vec![0u8; config.read_size];
    loop {
        let ready = poller.wait(None)?;
        for kind in ready.iter() {
            let nread = handles[kind.index()].read(&mut data)?;
            println!("nread {} = {}", kind.name(), nread);
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
