mod actions;
mod core;
mod logging;
mod room;
mod state;
mod store;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use room::room_id;
pub use state::*;
pub use store::MessageStore;
pub use transport::http::RestTransport;
pub use transport::{
    ChatTransport, DirectoryEntry, PushAuth, PushCommand, PushEvent, PushHandle, SendAck,
    SendMessageRequest, TransportError, WireMessage,
};
pub use updates::*;

use crate::core::SharedTransportOverride;

/// Default `farmlink_config.json` payload used when no config file exists.
#[uniffi::export]
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

/// Parse a role name as stored by the shell or served by the backend.
/// Accepts the legacy `plant pathologist` spelling.
#[uniffi::export]
pub fn parse_role_name(input: &str) -> Option<Role> {
    Role::from_wire(input)
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    transport_override: SharedTransportOverride,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let transport_override: SharedTransportOverride = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let override_for_core = transport_override.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                override_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            transport_override,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl FfiApp {
    /// Inject the transport the next restored session will use, in place of
    /// the REST one built from config. Mirrors the production wiring so test
    /// flows exercise the real actor.
    pub fn set_transport_for_tests(&self, transport: Arc<dyn ChatTransport>) {
        match self.transport_override.write() {
            Ok(mut slot) => *slot = Some(transport),
            Err(poison) => *poison.into_inner() = Some(transport),
        }
    }
}
