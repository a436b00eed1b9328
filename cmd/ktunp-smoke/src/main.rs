//! KTUNP End-to-End Smoke Test
//!
//! Tests the full KTUNP stack:
//!   Part A — Address parser: in_aton packing, rejection rules
//!   Part B — Registry + control plane: show/store, acknowledgement
//!   Part C — Readiness channel + epoll: edges, coalescing, late waiters
//!   Part D — Pipeline (in-process source): dispatch rules, teardown
//!   Part E — rtnetlink source: socket open, subscribe, unsubscribe
//!
//! Run: ./target/release/ktunp-smoke
//! (Part E needs netlink access; it is skipped when the socket is refused)

use ktunp_core::addr::{in_aton, parse, NetAddr};
use ktunp_core::error::{KtunpError, ParseError};
use ktunp_core::event::{Event, NetNsId, NexthopId};
use ktunp_core::source::{AddrEventSource, EventSink, NexthopEventSource, Stream};
use ktunp_core::watch::{WatchKind, WatchMode, WatchTable};

use ktunp_module::config::PipelineConfig;
use ktunp_module::control::{ControlPlane, STORE_ACK_LEN};
use ktunp_module::manual_source::ManualSource;
use ktunp_module::netlink_source::NetlinkSource;
use ktunp_module::pipeline::PipelineBuilder;
use ktunp_module::poller::WatchPoller;
use ktunp_module::registry::{WatchHandle, WatchRegistry};

use std::sync::Arc;
use std::time::Duration;

const SHORT: Option<Duration> = Some(Duration::from_millis(20));

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0, skipped: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn skip(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.skipped += 1;
        println!("  [{:2}] {:<52} SKIP: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}  Skipped: {}",
            self.total, self.passed, self.failed, self.skipped
        );
        println!("{}", LINE);
    }
}

fn read_line(handle: &WatchHandle) -> String {
    let mut buf = [0u8; 100];
    match handle.read(&mut buf) {
        Ok(n) => String::from_utf8_lossy(&buf[..n]).into_owned(),
        Err(e) => format!("<read error: {}>", e),
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Address parser
// ════════════════════════════════════════════════════════════

fn test_parser(t: &mut TestRunner) {
    t.section("Part A: Address parser");

    let cases: [(&[u8], [u8; 4]); 5] = [
        (b"192.0.2.1", [192, 0, 2, 1]),
        (b"10.0.0.5\n", [10, 0, 0, 5]),
        (b"255.255.255.255", [255, 255, 255, 255]),
        (b"999.1.1.1", [231, 1, 1, 1]),
        (b"1.1.2.300", [1, 1, 3, 44]),
    ];
    for (input, expected) in cases {
        let got = in_aton(input).octets();
        t.check(
            &format!("in_aton({:?})", String::from_utf8_lossy(input).trim_end()),
            got == expected,
            &format!("expected {:?} got {:?}", expected, got),
        );
    }

    t.check("in_aton(\"1.2.3\") -> 0.0.0.0", in_aton(b"1.2.3").is_unspecified(), "non-zero");
    t.check(
        "parse(\"1.2.3\") -> SegmentCount(2)",
        parse(b"1.2.3") == Err(ParseError::SegmentCount(2)),
        &format!("{:?}", parse(b"1.2.3")),
    );
    t.check(
        "parse(\"0.0.0.0\") -> Unspecified",
        parse(b"0.0.0.0") == Err(ParseError::Unspecified),
        &format!("{:?}", parse(b"0.0.0.0")),
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Registry + control plane
// ════════════════════════════════════════════════════════════

fn test_control(t: &mut TestRunner) {
    t.section("Part B: Registry + control plane");

    let registry = match WatchRegistry::new(4) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            t.fail("WatchRegistry::new(4)", &e.to_string());
            return;
        }
    };
    let cp = ControlPlane::new(Arc::clone(&registry));

    let names: Vec<_> = cp.resources().collect();
    t.check("resources = nexthop, inetaddr", names == ["nexthop", "inetaddr"], &format!("{:?}", names));

    let mode = registry.watch(WatchKind::NextHop).mode();
    t.check(
        "mode 0644",
        mode == WatchMode::DEFAULT && mode.world_readable() && mode.owner_writable(),
        &mode.to_string(),
    );

    let shown = cp.show_line("nexthop").unwrap_or_default();
    t.check("show unset nexthop", shown == "nexthop: 0.0.0.0\n", &shown);

    let ack = cp.store("inetaddr", b"192.0.2.1\n");
    t.check("store inetaddr ack", ack == Some(STORE_ACK_LEN), &format!("{:?}", ack));
    let shown = cp.show_line("inetaddr").unwrap_or_default();
    t.check("show inetaddr", shown == "inetaddr: 192.0.2.1\n", &shown);

    let ack = cp.store("inetaddr", b"bogus");
    let shown = cp.show_line("inetaddr").unwrap_or_default();
    t.check(
        "rejected store acks, keeps target",
        ack == Some(STORE_ACK_LEN) && shown == "inetaddr: 192.0.2.1\n",
        &shown,
    );

    t.check("unknown resource", cp.show_line("route").is_none(), "resolved");
}

// ════════════════════════════════════════════════════════════
// Part C: Readiness channel + epoll
// ════════════════════════════════════════════════════════════

fn test_channel(t: &mut TestRunner) -> Result<(), KtunpError> {
    t.section("Part C: Readiness channel + epoll");

    let registry = Arc::new(WatchRegistry::new(2)?);
    let nh = registry.open(WatchKind::NextHop)?;
    let ia = registry.open(WatchKind::InetAddr)?;
    let mut poller = WatchPoller::new(10)?;
    poller.register(&nh)?;
    poller.register(&ia)?;

    let ready = poller.wait(SHORT)?;
    t.check("idle: wait times out", ready.is_empty(), &format!("{:?}", ready));

    registry.notify(WatchKind::NextHop);
    registry.notify(WatchKind::NextHop);
    let ready = poller.wait(SHORT)?;
    t.check(
        "burst of 2 triggers -> 1 edge on nexthop",
        ready.len() == 1 && ready.contains(WatchKind::NextHop),
        &format!("{:?}", ready),
    );
    let stats = registry.stats(WatchKind::NextHop);
    t.check("coalesced count = 1", stats.coalesced == 1, &format!("{:?}", stats));

    let ready = poller.wait(SHORT)?;
    t.check("no re-report while ready", ready.is_empty(), &format!("{:?}", ready));

    let line = read_line(&nh);
    t.check("read acknowledges", !nh.is_ready() && line == "nexthop: 0.0.0.0\n", &line);

    registry.notify(WatchKind::InetAddr);
    let late = registry.open(WatchKind::InetAddr);
    t.check("second inetaddr waiter opens", late.is_ok(), "refused");
    let full = registry.open(WatchKind::InetAddr);
    t.check(
        "third waiter -> WaiterTableFull",
        matches!(full, Err(KtunpError::WaiterTableFull(_))),
        "opened",
    );
    if let Ok(late) = late {
        t.check("late waiter starts signalled", late.is_ready(), "not ready");
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════
// Part D: Pipeline with in-process source
// ════════════════════════════════════════════════════════════

fn test_pipeline(t: &mut TestRunner) -> Result<(), KtunpError> {
    t.section("Part D: Pipeline (in-process source)");

    let src = ManualSource::new();
    let config = PipelineConfig::new()
        .max_waiters(4)
        .namespaces(vec![NetNsId(0), NetNsId(3)])
        .nexthop("10.0.0.5")
        .inetaddr("192.0.2.1");
    let mut pipeline = PipelineBuilder::new(config).build(&src, &src)?;
    t.check("3 subscriptions", pipeline.streams().count() == 3, "count mismatch");

    let nh = pipeline.open(WatchKind::NextHop)?;
    let ia = pipeline.open(WatchKind::InetAddr)?;

    src.emit(Event::AddressUp { netns: NetNsId(0), address: NetAddr::from_octets([192, 0, 2, 2]) });
    t.check("addr-up non-target ignored", !ia.is_ready(), "triggered");

    src.emit(Event::AddressUp { netns: NetNsId(9), address: NetAddr::from_octets([192, 0, 2, 1]) });
    t.check("addr-up target triggers inetaddr", ia.is_ready() && !nh.is_ready(), "wrong watch");
    let line = read_line(&ia);
    t.check("inetaddr read", line == "inetaddr: 192.0.2.1\n", &line);

    src.emit(Event::NextHopDeleted { netns: NetNsId(3), nexthop_id: NexthopId(42) });
    t.check("nexthop-del (any id) triggers nexthop", nh.is_ready(), "not ready");
    let line = read_line(&nh);
    t.check("nexthop read", line == "nexthop: 10.0.0.5\n", &line);

    src.emit(Event::NextHopDeleted { netns: NetNsId(3), nexthop_id: NexthopId(0) });
    t.check("nexthop id 0 dropped", !nh.is_ready(), "triggered");

    pipeline.shutdown();
    t.check(
        "shutdown unsubscribes all",
        src.subscribers(Stream::Addr) == 0 && src.subscribers(Stream::Nexthop(NetNsId(3))) == 0,
        "subscribers remain",
    );

    src.fail_next_nexthop();
    let failed = PipelineBuilder::new(PipelineConfig::new()).build(&src, &src);
    t.check(
        "failed startup unwinds addr subscription",
        failed.is_err() && src.subscribers(Stream::Addr) == 0,
        "addr subscription leaked",
    );
    Ok(())
}

// ════════════════════════════════════════════════════════════
// Part E: rtnetlink source
// ════════════════════════════════════════════════════════════

struct Discard;

impl EventSink for Discard {
    fn deliver(&self, _event: Event) {}
}

fn test_netlink(t: &mut TestRunner) {
    t.section("Part E: rtnetlink source");

    let source = NetlinkSource::new(NetNsId::CURRENT, Duration::from_millis(50), 8192);

    match source.subscribe_addr(Arc::new(Discard)) {
        Ok(sub) => {
            t.check("subscribe RTMGRP_IPV4_IFADDR", sub.stream() == Stream::Addr, "wrong stream");
            drop(sub);
            t.pass("unsubscribe joins reader");
        }
        Err(e) => t.skip("subscribe RTMGRP_IPV4_IFADDR", &e.to_string()),
    }

    match source.subscribe_nexthop(NetNsId::CURRENT, Arc::new(Discard)) {
        Ok(_sub) => t.pass("subscribe RTNLGRP_NEXTHOP"),
        Err(e) => t.skip("subscribe RTNLGRP_NEXTHOP", &format!("{} (kernel < 5.3?)", e)),
    }

    let foreign = source.subscribe_nexthop(NetNsId(7), Arc::new(Discard));
    t.check("foreign namespace refused", foreign.is_err(), "subscribed");
}

// ════════════════════════════════════════════════════════════

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("KTUNP_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    println!("=== KTUNP End-to-End Smoke Test ===");
    let kver = std::fs::read_to_string("/proc/version").unwrap_or_default();
    println!("    kernel: {}", kver.trim().split(' ').nth(2).unwrap_or("?"));

    let mut t = TestRunner::new();

    test_parser(&mut t);
    test_control(&mut t);
    if let Err(e) = test_channel(&mut t) {
        t.fail("channel setup", &e.to_string());
    }
    if let Err(e) = test_pipeline(&mut t) {
        t.fail("pipeline setup", &e.to_string());
    }
    test_netlink(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
