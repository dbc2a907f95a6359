//! Shelf-driven activation over a running IPMB interface.

use hotswap::{
    HandleState, HotswapApi, HotswapConfig, HotswapController, HotswapEvent, MState,
    PayloadPower, PicmgHandler, PlatformEventSink, TransitionReason,
};
use ipmb_transport::testing::BusHarness;
use ipmb_transport::{BusId, IpmbApi, IpmbConfig, Message};
use std::sync::{Arc, Weak};

const IPMC: u8 = 0x72;
const SHELF: u8 = 0x20;
const SENSOR: u8 = 0x01;

struct InstantPayload {
    controller: Weak<HotswapController>,
}

impl PayloadPower for InstantPayload {
    fn begin_activation(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.payload_activation_complete();
        }
    }

    fn deactivate(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.payload_deactivation_complete();
        }
    }
}

struct Shelf {
    harness: BusHarness,
    controller: Arc<HotswapController>,
    _payload: Arc<InstantPayload>,
    next_seq: u8,
}

impl Shelf {
    fn start() -> Self {
        let harness = BusHarness::start(IpmbConfig::with_address(IPMC));
        let ipmb: Arc<dyn IpmbApi> = Arc::new(harness.handle.clone());
        let sink = PlatformEventSink::new(ipmb, SHELF, SENSOR);
        let controller = Arc::new(HotswapController::new(
            HotswapConfig::default(),
            Arc::new(sink),
        ));
        PicmgHandler::new(Arc::clone(&controller)).register(harness.handle.dispatch_table());

        let payload = Arc::new(InstantPayload {
            controller: Arc::downgrade(&controller),
        });
        controller.attach_payload(&payload);
        Self {
            harness,
            controller,
            _payload: payload,
            next_seq: 0,
        }
    }

    fn command(&mut self, cmd: u8, data: Vec<u8>) {
        let mut request = Message::request(SHELF, IPMC, 0x2C, cmd, data);
        request.rq_seq = self.next_seq;
        self.next_seq += 1;
        self.harness.inject(BusId::A, &request);
    }

    /// Read `count` frames, acknowledging every platform event.
    /// Events come back ordered by new state; bus interleaving is not
    /// deterministic.
    async fn collect(&mut self, count: usize) -> (Vec<HotswapEvent>, Vec<Message>) {
        let mut events = Vec::new();
        let mut replies = Vec::new();
        for _ in 0..count {
            let (bus, msg) = self.harness.next_message().await.unwrap();
            if msg.is_response() {
                replies.push(msg);
                continue;
            }
            assert_eq!((msg.rs_addr, msg.net_fn, msg.cmd), (SHELF, 0x04, 0x02));
            self.harness.inject(bus, &msg.prepare_reply(vec![0x00]));
            let (sensor, event) = HotswapEvent::from_platform_event(&msg.data).unwrap();
            assert_eq!(sensor, SENSOR);
            events.push(event);
        }
        events.sort_by_key(|e| e.new_state);
        (events, replies)
    }
}

fn states(events: &[HotswapEvent]) -> Vec<MState> {
    events.iter().map(|e| e.new_state).collect()
}

#[tokio::test(start_paused = true)]
async fn test_shelf_activates_and_deactivates() {
    let mut shelf = Shelf::start();

    shelf.controller.set_physical_handle(HandleState::Closed);
    let (events, _) = shelf.collect(2).await;
    assert_eq!(states(&events), vec![MState::M1, MState::M2]);

    shelf.command(0x0C, vec![0x00, 0x00, 0x01]);
    let (events, replies) = shelf.collect(3).await;
    assert_eq!(states(&events), vec![MState::M3, MState::M4]);
    assert_eq!(events[0].reason, TransitionReason::CommandedByShelf);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].data, vec![0x00, 0x00]);
    assert_eq!(shelf.controller.get_mstate(), 4);

    shelf.command(0x0C, vec![0x00, 0x00, 0x00]);
    let (events, replies) = shelf.collect(3).await;
    assert_eq!(states(&events), vec![MState::M1, MState::M6]);
    assert_eq!(replies[0].completion_code(), Some(0x00));
    assert_eq!(shelf.controller.mstate(), MState::M1);
}

#[tokio::test(start_paused = true)]
async fn test_activation_policy_holds_fru_inactive() {
    let mut shelf = Shelf::start();

    // Activate and deactivate so the FRU sits in M1 with the handle closed.
    shelf.controller.set_physical_handle(HandleState::Closed);
    shelf.collect(2).await;
    shelf.command(0x0C, vec![0x00, 0x00, 0x01]);
    shelf.collect(3).await;
    shelf.command(0x0C, vec![0x00, 0x00, 0x00]);
    let (events, _) = shelf.collect(3).await;
    assert_eq!(states(&events), vec![MState::M1, MState::M6]);

    shelf.command(0x0A, vec![0x00, 0x00, 0x01, 0x01]);
    let (events, replies) = shelf.collect(1).await;
    assert!(events.is_empty());
    assert_eq!(replies[0].data, vec![0x00, 0x00]);

    shelf.command(0x0B, vec![0x00, 0x00]);
    let (_, replies) = shelf.collect(1).await;
    assert_eq!(replies[0].data, vec![0x00, 0x00, 0x01]);
    assert_eq!(shelf.controller.mstate(), MState::M1);

    // Releasing the lock lets the closed handle request activation.
    shelf.command(0x0A, vec![0x00, 0x00, 0x01, 0x00]);
    let (events, replies) = shelf.collect(2).await;
    assert_eq!(states(&events), vec![MState::M2]);
    assert_eq!(replies.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_fru_is_rejected() {
    let mut shelf = Shelf::start();
    shelf.command(0x0C, vec![0x00, 0x01, 0x01]);
    let (events, replies) = shelf.collect(1).await;
    assert!(events.is_empty());
    assert_eq!(replies[0].completion_code(), Some(0xC9));
}
