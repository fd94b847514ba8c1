use std::sync::Arc;

use relaychat_chat::ports::AuthPort;
use relaychat_chat::{ChatService, ConversationView, FriendsService, MembershipService, ReadReceiptAggregator, RecallForwardService};
use relaychat_notify::NotificationService;
use relaychat_session::SessionHub;
use relaychat_store::Store;

/// Shared state for the WebSocket transport: the session hub plus every
/// `relaychat-chat` service, all wired over the same [`Store`] and
/// [`SessionHub`]-as-`Notifier`. One struct the route handlers hold an
/// `Arc` to.
pub struct GatewayState {
    pub hub: Arc<SessionHub>,
    pub chat: ChatService,
    pub recall_forward: RecallForwardService,
    pub read_receipts: ReadReceiptAggregator,
    pub membership: MembershipService,
    pub friends: FriendsService,
    pub conversation_view: ConversationView,
    pub notify: NotificationService,
    pub auth: Arc<dyn AuthPort>,
    pub max_frame_bytes: usize,
    pub read_deadline_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub read_flush_interval_secs: u64,
}

impl GatewayState {
    /// Build from a loaded [`relaychat_config::RelaychatConfig`] — the
    /// shape an embedder actually has on hand at startup.
    pub fn from_config(store: Store, auth: Arc<dyn AuthPort>, config: &relaychat_config::RelaychatConfig) -> Arc<Self> {
        Self::new(
            store,
            auth,
            config.policy.resolved_timezone(),
            config.policy.recall_window_secs,
            config.session.max_frame_bytes,
            config.session.read_deadline_secs,
            config.session.heartbeat_interval_secs,
            config.session.read_flush_interval_secs,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        auth: Arc<dyn AuthPort>,
        tz: chrono_tz::Tz,
        recall_window_secs: i64,
        max_frame_bytes: usize,
        read_deadline_secs: u64,
        heartbeat_interval_secs: u64,
        read_flush_interval_secs: u64,
    ) -> Arc<Self> {
        let hub = Arc::new(SessionHub::new());
        let notifier: Arc<dyn relaychat_common::Notifier> = hub.clone();

        let chat = ChatService::new(store.clone(), notifier.clone(), tz);
        let recall_forward = RecallForwardService::new(chat.clone(), recall_window_secs);
        let read_receipts = ReadReceiptAggregator::new(store.clone());
        let notify = NotificationService::new(store.clone(), notifier.clone());
        let membership = MembershipService::new(chat.clone(), notify.clone());
        let friends = FriendsService::new(store.clone(), notifier.clone());
        let conversation_view = ConversationView::new(store.clone());

        Arc::new(Self {
            hub,
            chat,
            recall_forward,
            read_receipts,
            membership,
            friends,
            conversation_view,
            notify,
            auth,
            max_frame_bytes,
            read_deadline_secs,
            heartbeat_interval_secs,
            read_flush_interval_secs,
        })
    }
}
