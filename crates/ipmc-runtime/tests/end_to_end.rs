//! End-to-end tests: a complete IPMC driven by the simulated shelf.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use hotswap::{HandleState, HotswapApi, HotswapEvent, MState, TransitionReason};
use ipmb_transport::BusId;
use ipmc_bus::{EventFilter, EventTopic, IpmcEvent, Subscription};
use ipmc_runtime::{ConfigError, IpmcConfig, IpmcRuntime};
use tokio::time::{sleep, timeout};

const NETFN_APP: u8 = 0x06;
const NETFN_PICMG: u8 = 0x2C;
const SET_FRU_ACTIVATION: u8 = 0x0C;
const GET_FRU_ACTIVATION_POLICY: u8 = 0x0B;

fn config() -> IpmcConfig {
    let mut config = IpmcConfig::default();
    config.hotswap.power_up_delay = Duration::from_millis(100);
    config.hotswap.power_down_delay = Duration::from_millis(50);
    config
}

async fn wait_for_state(events: &mut Subscription, state: MState) -> HotswapEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(IpmcEvent::HotswapTransition(event)) if event.new_state == state => {
                    return event;
                }
                Some(_) => {}
                None => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("hot-swap state not reached")
}

async fn wait_for_delivery_failure(events: &mut Subscription) -> (u8, u8, String) {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(IpmcEvent::DeliveryFailed { request, reason }) => {
                    return (request.net_fn, request.cmd, reason);
                }
                Some(_) => {}
                None => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("no delivery failure reported")
}

/// Formatted log output kept in memory.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

/// Wait until the shelf has acknowledged an event announcing `state`.
async fn shelf_sees(runtime: &IpmcRuntime, state: MState) {
    let shelf = runtime.container().shelf.clone();
    timeout(Duration::from_secs(5), async {
        while !shelf
            .hotswap_events()
            .iter()
            .any(|e| e.new_state == state)
        {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("shelf never saw the event");
}

#[tokio::test(start_paused = true)]
async fn test_handle_close_and_shelf_activation() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Hotswap]));
    let shelf = runtime.container().shelf.clone();

    runtime.set_handle(HandleState::Closed);
    let event = wait_for_state(&mut events, MState::M2).await;
    assert_eq!(event.previous_state, MState::M1);
    assert_eq!(event.reason, TransitionReason::OperatorSwitch);
    shelf_sees(&runtime, MState::M2).await;

    let reply = shelf
        .command(NETFN_PICMG, SET_FRU_ACTIVATION, vec![0x00, 0x00, 0x01])
        .await
        .unwrap();
    assert_eq!(reply.data, vec![0x00, 0x00]);

    let event = wait_for_state(&mut events, MState::M3).await;
    assert_eq!(event.reason, TransitionReason::CommandedByShelf);
    assert!(!runtime.container().payload.is_powered());

    wait_for_state(&mut events, MState::M4).await;
    assert!(runtime.container().payload.is_powered());
    shelf_sees(&runtime, MState::M4).await;
    assert!(shelf.platform_events() >= 4);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shelf_deactivation_powers_down() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::all());
    let shelf = runtime.container().shelf.clone();

    runtime.set_handle(HandleState::Closed);
    wait_for_state(&mut events, MState::M2).await;
    shelf
        .command(NETFN_PICMG, SET_FRU_ACTIVATION, vec![0x00, 0x00, 0x01])
        .await
        .unwrap();
    wait_for_state(&mut events, MState::M4).await;

    let reply = shelf
        .command(NETFN_PICMG, SET_FRU_ACTIVATION, vec![0x00, 0x00, 0x00])
        .await
        .unwrap();
    assert_eq!(reply.completion_code(), Some(0x00));

    wait_for_state(&mut events, MState::M6).await;
    let event = wait_for_state(&mut events, MState::M1).await;
    assert_eq!(event.previous_state, MState::M6);
    assert!(!runtime.container().payload.is_powered());
    assert_eq!(runtime.hotswap().mstate(), MState::M1);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_handle_open_in_m4_requests_deactivation() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Hotswap]));
    let shelf = runtime.container().shelf.clone();

    runtime.set_handle(HandleState::Closed);
    wait_for_state(&mut events, MState::M2).await;
    shelf
        .command(NETFN_PICMG, SET_FRU_ACTIVATION, vec![0x00, 0x00, 0x01])
        .await
        .unwrap();
    wait_for_state(&mut events, MState::M4).await;

    runtime.set_handle(HandleState::Open);
    let event = wait_for_state(&mut events, MState::M5).await;
    assert_eq!(event.reason, TransitionReason::OperatorSwitch);
    assert!(runtime.container().payload.is_powered());

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_policy_query_through_runtime() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let shelf = runtime.container().shelf.clone();

    let reply = shelf
        .command(NETFN_PICMG, GET_FRU_ACTIVATION_POLICY, vec![0x00, 0x00])
        .await
        .unwrap();
    assert_eq!(reply.data, vec![0x00, 0x00, 0x00]);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_command_is_invalid() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let shelf = runtime.container().shelf.clone();

    // Get Device ID has no handler in this core.
    let reply = shelf.command(NETFN_APP, 0x01, vec![]).await.unwrap();
    assert_eq!(reply.completion_code(), Some(0xC1));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failover_to_bus_b() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::all());
    runtime.set_bus_enabled(BusId::A, false);

    match events.recv().await {
        Some(IpmcEvent::BusEnableChanged { bus, enabled }) => {
            assert_eq!(bus, BusId::A);
            assert!(!enabled);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    runtime.set_handle(HandleState::Closed);
    wait_for_state(&mut events, MState::M2).await;
    shelf_sees(&runtime, MState::M2).await;

    let container = runtime.container();
    assert_eq!(container.buses[BusId::A.index()].frames_sent(), 0);
    assert!(container.buses[BusId::B.index()].frames_sent() >= 2);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bus_state_change_logged_once() {
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Transport]));
    runtime.set_bus_enabled(BusId::B, false);
    // Already disabled: published again but not a state change.
    runtime.set_bus_enabled(BusId::B, false);

    for _ in 0..2 {
        assert!(matches!(
            events.recv().await,
            Some(IpmcEvent::BusEnableChanged { bus: BusId::B, enabled: false })
        ));
    }
    assert_eq!(logs.text().matches("Bus administrative state changed").count(), 1);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_both_buses_disabled_reports_delivery_failure() {
    let runtime = IpmcRuntime::start(config()).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Transport]));
    runtime.set_bus_enabled(BusId::A, false);
    runtime.set_bus_enabled(BusId::B, false);

    runtime.set_handle(HandleState::Closed);
    let (net_fn, cmd, reason) = wait_for_delivery_failure(&mut events).await;
    assert_eq!((net_fn, cmd), (0x04, 0x02));
    assert!(reason.contains("disabled"));

    // The state machine does not wait for the shelf.
    assert_eq!(runtime.hotswap().mstate(), MState::M2);
    assert_eq!(runtime.container().ipmb.stats().no_bus_available, 2);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_platform_event_exhausts_retries() {
    let mut config = config();
    config.simulate_shelf = false;
    config.ipmb.max_retries = 2;
    let runtime = IpmcRuntime::start(config).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Transport]));

    runtime.set_handle(HandleState::Closed);
    let (net_fn, _, reason) = wait_for_delivery_failure(&mut events).await;
    assert_eq!(net_fn, 0x04);
    assert!(reason.contains("3 attempts"));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_metrics_refresh() {
    let mut config = config();
    config.telemetry.metrics_enabled = true;
    config.metrics_interval = Duration::from_millis(50);
    let runtime = IpmcRuntime::start(config).await.unwrap();
    let mut events = runtime.subscribe(EventFilter::topics(vec![EventTopic::Hotswap]));

    runtime.set_handle(HandleState::Closed);
    wait_for_state(&mut events, MState::M2).await;
    shelf_sees(&runtime, MState::M2).await;
    sleep(Duration::from_millis(120)).await;

    let text = ipmc_telemetry::metrics::gather_text().unwrap();
    assert!(text.contains("ipmc_ipmb_stat{stat=\"send_attempts\"}"));
    assert!(text.contains("ipmc_hotswap_transitions_total{to=\"M2\"}"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let mut config = config();
    config.ipmb.local_address = 0x73;
    let result = IpmcRuntime::start(config).await;
    assert!(matches!(result, Err(ConfigError::InvalidAddress(0x73))));
}
