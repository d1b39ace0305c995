//! Links: directed event-delivery channels between components.
//!
//! A link connects a sender component's output port to a recipient. It
//! applies a per-link latency floor to every send and delivers either by
//! invoking the recipient's registered [`Handler`] from the main loop
//! (push) or by parking events in a [`PollingLinkQueue`] the recipient
//! drains itself (pull). A link whose recipient lives on another rank
//! routes sends into the barrier's outbound batch instead.
//!
//! Links also carry the init-phase data path: configuration events moved
//! before t=0 with no timing semantics.

use std::collections::{HashMap, VecDeque};

use crate::activity::Event;
use crate::queue::PollingLinkQueue;
use crate::types::{ComponentId, LinkId, Rank, SimTime};

/// A handler binding: the recipient entity, the port the event arrives
/// on, and an optional bound argument handed back on every dispatch.
///
/// Handlers are plain values owned by their link; dispatch goes through
/// the recipient component's event method rather than a callback object.
#[derive(Clone, Debug, PartialEq)]
pub struct Handler {
    /// The entity (component or sub-component) that receives the event.
    pub target: ComponentId,
    /// The recipient-side port name.
    pub port: String,
    /// Optional argument bound at registration time.
    pub arg: Option<serde_json::Value>,
}

impl Handler {
    /// Creates a handler for `target`'s `port` with no bound argument.
    pub fn new(target: ComponentId, port: impl Into<String>) -> Self {
        Self {
            target,
            port: port.into(),
            arg: None,
        }
    }

    /// Binds an argument delivered alongside every event.
    pub fn with_arg(mut self, arg: serde_json::Value) -> Self {
        self.arg = Some(arg);
        self
    }
}

/// How a link delivers events on the recipient side.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// Invoke the handler from the main loop when the event's time comes.
    Handler(Handler),
    /// Park events in the link's polling queue until the recipient
    /// drains them.
    Polling,
}

/// A unidirectional delivery channel.
pub struct Link {
    /// Dense id, identical on both endpoints of a cross-rank link.
    pub id: LinkId,
    /// Configuration name, used in diagnostics.
    pub name: String,
    /// Sending component and port.
    pub sender: ComponentId,
    pub sender_port: String,
    /// Receiving component and port.
    pub recipient: ComponentId,
    pub recipient_port: String,
    /// Minimum delivery latency in core cycles.
    pub latency: SimTime,
    /// Recipient-side delivery mode.
    pub delivery: Delivery,
    /// `Some(rank)` when the recipient lives on another rank; sends then
    /// route into the barrier's outbound batch for that peer.
    pub peer_rank: Option<Rank>,
    /// Present iff the delivery mode is polling.
    pub polling_queue: Option<PollingLinkQueue>,
    /// Init data staged for the next cross-rank init exchange.
    pub init_send: Vec<Event>,
    /// Init data awaiting `recv_init_data` on the recipient side.
    pub init_recv: VecDeque<Event>,
}

impl Link {
    /// Creates a handler-mode local link. The handler targets the
    /// recipient's port.
    pub fn new(
        name: impl Into<String>,
        sender: ComponentId,
        sender_port: impl Into<String>,
        recipient: ComponentId,
        recipient_port: impl Into<String>,
    ) -> Self {
        let recipient_port = recipient_port.into();
        Self {
            id: crate::types::NO_LINK,
            name: name.into(),
            sender,
            sender_port: sender_port.into(),
            recipient,
            recipient_port: recipient_port.clone(),
            latency: 0,
            delivery: Delivery::Handler(Handler::new(recipient, recipient_port)),
            peer_rank: None,
            polling_queue: None,
            init_send: Vec::new(),
            init_recv: VecDeque::new(),
        }
    }

    /// Sets the latency floor.
    pub fn with_latency(mut self, latency: SimTime) -> Self {
        self.latency = latency;
        self
    }

    /// Switches the link to polling delivery.
    pub fn polling(mut self) -> Self {
        self.delivery = Delivery::Polling;
        self.polling_queue = Some(PollingLinkQueue::new());
        self
    }

    /// Binds an argument to the recipient handler.
    pub fn with_handler_arg(mut self, arg: serde_json::Value) -> Self {
        if let Delivery::Handler(h) = &mut self.delivery {
            h.arg = Some(arg);
        }
        self
    }

    /// Marks the recipient as living on `rank` (sender-side stub of a
    /// cross-rank link).
    pub fn to_peer(mut self, rank: Rank) -> Self {
        self.peer_rank = Some(rank);
        self
    }

    /// Returns true if sends on this link leave the rank.
    pub fn is_remote(&self) -> bool {
        self.peer_rank.is_some()
    }

    /// The recipient handler, if this is a handler link.
    pub fn handler(&self) -> Option<&Handler> {
        match &self.delivery {
            Delivery::Handler(h) => Some(h),
            Delivery::Polling => None,
        }
    }

    /// Absolute delivery cycle for a send issued at `now` with the given
    /// delay. The link latency is a floor: a shorter delay is clamped.
    #[inline]
    pub fn delivery_time(&self, now: SimTime, delay: SimTime) -> SimTime {
        now + delay.max(self.latency)
    }

    /// Enqueues init data on the recipient side, re-stamping the link id.
    ///
    /// The barrier's init exchange resets the id of events it ferries, so
    /// the stamp here is authoritative.
    pub fn send_init_data(&mut self, mut event: Event) {
        event.link_id = self.id;
        self.init_recv.push_back(event);
    }

    /// Stages init data on the sender side of a cross-rank link for the
    /// next init exchange.
    pub fn stage_init_data(&mut self, mut event: Event) {
        debug_assert!(self.is_remote(), "init data staged on a local link");
        event.link_id = self.id;
        self.init_send.push(event);
    }

    /// Takes everything staged for the init exchange.
    pub fn take_staged_init(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.init_send)
    }

    /// Pops the next pending init event on the recipient side.
    pub fn recv_init_data(&mut self) -> Option<Event> {
        self.init_recv.pop_front()
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("latency", &self.latency)
            .field("delivery", &self.delivery)
            .field("peer_rank", &self.peer_rank)
            .finish()
    }
}

/// All links of a rank, indexed by dense [`LinkId`].
///
/// Ids are assigned from the shared configuration's link order, so both
/// endpoints of a cross-rank link agree on the id without any exchange.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    links: std::collections::BTreeMap<LinkId, Link>,
    by_sender: HashMap<(ComponentId, String), LinkId>,
    by_recipient: HashMap<(ComponentId, String), LinkId>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a link under an explicit id.
    pub fn insert(&mut self, id: LinkId, mut link: Link) {
        link.id = id;
        if let Delivery::Handler(h) = &mut link.delivery {
            // Keep the handler target in step with the link endpoints.
            h.target = link.recipient;
        }
        self.by_sender
            .insert((link.sender, link.sender_port.clone()), id);
        if !link.is_remote() {
            self.by_recipient
                .insert((link.recipient, link.recipient_port.clone()), id);
        }
        self.links.insert(id, link);
    }

    /// Looks up a link by id.
    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    /// The link sent on by `component`'s `port`, if any.
    pub fn find_sender(&self, component: ComponentId, port: &str) -> Option<LinkId> {
        self.by_sender
            .get(&(component, port.to_string()))
            .copied()
    }

    /// The link received on by `component`'s `port`, if any.
    pub fn find_recipient(&self, component: ComponentId, port: &str) -> Option<LinkId> {
        self.by_recipient
            .get(&(component, port.to_string()))
            .copied()
    }

    /// Looks up a link by configuration name.
    pub fn find_by_name(&self, name: &str) -> Option<LinkId> {
        self.links
            .values()
            .find(|l| l.name == name)
            .map(|l| l.id)
    }

    /// Iterates links in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Iterates links mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.values_mut()
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true if no links are registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(i: u32) -> ComponentId {
        ComponentId::component(i)
    }

    #[test]
    fn test_latency_floor() {
        let link = Link::new("l", cid(0), "out", cid(1), "in").with_latency(10);

        // Shorter delays are clamped to the latency
        assert_eq!(link.delivery_time(100, 0), 110);
        assert_eq!(link.delivery_time(100, 5), 110);
        // Longer delays pass through
        assert_eq!(link.delivery_time(100, 25), 125);
    }

    #[test]
    fn test_handler_link_targets_recipient() {
        let link = Link::new("l", cid(0), "out", cid(1), "in");
        let handler = link.handler().unwrap();
        assert_eq!(handler.target, cid(1));
        assert_eq!(handler.port, "in");
        assert!(handler.arg.is_none());
    }

    #[test]
    fn test_polling_link_has_queue_and_no_handler() {
        let link = Link::new("l", cid(0), "out", cid(1), "in").polling();
        assert!(link.handler().is_none());
        assert!(link.polling_queue.is_some());
    }

    #[test]
    fn test_handler_bound_arg() {
        let link = Link::new("l", cid(0), "out", cid(1), "in")
            .with_handler_arg(serde_json::json!({"lane": 3}));
        assert_eq!(
            link.handler().unwrap().arg,
            Some(serde_json::json!({"lane": 3}))
        );
    }

    #[test]
    fn test_init_data_restamps_link_id() {
        let mut link = Link::new("l", cid(0), "out", cid(1), "in");
        link.id = 4;

        let ev = Event::new(serde_json::json!("boot"));
        link.send_init_data(ev);

        let got = link.recv_init_data().unwrap();
        assert_eq!(got.link_id, 4);
        assert!(link.recv_init_data().is_none());
    }

    #[test]
    fn test_staged_init_drains_once() {
        let mut link = Link::new("l", cid(0), "out", cid(1), "in").to_peer(1);
        link.id = 2;
        link.stage_init_data(Event::new(serde_json::json!(1)));
        link.stage_init_data(Event::new(serde_json::json!(2)));

        let staged = link.take_staged_init();
        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|e| e.link_id == 2));
        assert!(link.take_staged_init().is_empty());
    }

    #[test]
    fn test_registry_lookup_by_endpoint() {
        let mut reg = LinkRegistry::new();
        reg.insert(0, Link::new("a", cid(0), "out", cid(1), "in"));
        reg.insert(1, Link::new("b", cid(1), "out", cid(0), "in").polling());

        assert_eq!(reg.find_sender(cid(0), "out"), Some(0));
        assert_eq!(reg.find_recipient(cid(1), "in"), Some(0));
        assert_eq!(reg.find_sender(cid(1), "out"), Some(1));
        assert_eq!(reg.find_by_name("b"), Some(1));
        assert_eq!(reg.find_sender(cid(0), "missing"), None);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_registry_remote_links_have_no_local_recipient() {
        let mut reg = LinkRegistry::new();
        reg.insert(0, Link::new("x", cid(0), "out", cid(1), "in").to_peer(1));

        assert_eq!(reg.find_sender(cid(0), "out"), Some(0));
        // Recipient lives on another rank
        assert_eq!(reg.find_recipient(cid(1), "in"), None);
    }
}
