//! The session gate: a small façade deciding what the hosting UI
//! should show and funneling user actions into the channel.
//!
//! The gate never talks to the network itself. It drives a
//! [`LinkControl`] (the channel handle in production, a recording stub
//! in tests) and mirrors the state and auth events the channel reports,
//! turning them into a single [`Posture`] answer: prompt for a secret,
//! or show room content with an optional reconnecting overlay.

use tracing::{debug, info, warn};

use roomlink_channel::{
    AuthEvent, AuthPhase, ChannelError, ChannelHandle, LinkState,
};
use roomlink_protocol::Credential;

use crate::store::CredentialStore;

// ---------------------------------------------------------------------------
// LinkControl
// ---------------------------------------------------------------------------

/// The slice of channel operations the gate needs.
///
/// Operations fail with [`ChannelError::Closed`] when the channel's
/// driver is gone; the gate logs that and degrades, since a UI façade
/// has nowhere useful to propagate it.
pub trait LinkControl {
    fn connect(&self) -> Result<(), ChannelError>;
    fn authenticate(&self, credential: Credential) -> Result<(), ChannelError>;
    fn logout(&self) -> Result<(), ChannelError>;
}

impl LinkControl for ChannelHandle {
    fn connect(&self) -> Result<(), ChannelError> {
        ChannelHandle::connect(self)
    }

    fn authenticate(&self, credential: Credential) -> Result<(), ChannelError> {
        ChannelHandle::authenticate(self, credential)
    }

    fn logout(&self) -> Result<(), ChannelError> {
        ChannelHandle::logout(self)
    }
}

// ---------------------------------------------------------------------------
// Posture
// ---------------------------------------------------------------------------

/// What the hosting UI should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    /// Ask the user for a room secret.
    Prompt,
    /// Show room content; `reconnecting` raises the degraded-connection
    /// overlay.
    Content { reconnecting: bool },
}

// ---------------------------------------------------------------------------
// SessionGate
// ---------------------------------------------------------------------------

/// Session-level wrapper around a channel.
///
/// Owns the credential store: a secret is persisted only once the
/// server accepts it, and wiped the moment the server rejects it, so
/// the store never holds a credential known to be bad.
pub struct SessionGate<C: LinkControl, S: CredentialStore> {
    control: C,
    store: S,
    link: LinkState,
    /// True from the first grant until a denial or logout. While true,
    /// connection loss shows the reconnect overlay instead of kicking
    /// the user back to the prompt.
    has_ever_authenticated: bool,
    /// Credential awaiting a server verdict; persisted on grant.
    submitted: Option<Credential>,
    last_error: Option<String>,
}

impl<C: LinkControl, S: CredentialStore> SessionGate<C, S> {
    /// Builds the gate and resumes a stored session if one exists.
    ///
    /// A stored secret is handed to the controller right away; the
    /// channel holds it until the transport opens, so a page reload
    /// lands back in the room without prompting.
    pub fn new(control: C, store: S) -> Self {
        let stored = store.load();
        let has_ever_authenticated = stored.is_some();
        if let Some(credential) = stored {
            info!("resuming stored session");
            if control.authenticate(credential).is_err() {
                warn!("channel is gone; stored session not resumed");
            }
        }
        Self {
            control,
            store,
            link: LinkState::Disconnected,
            has_ever_authenticated,
            submitted: None,
            last_error: None,
        }
    }

    /// The user submitted a secret (and optionally a room id).
    ///
    /// Whitespace-only input is ignored. Connects on demand; when the
    /// channel is already open the handshake starts immediately.
    pub fn submit(&mut self, input: &str, room: Option<&str>) {
        let secret = input.trim();
        if secret.is_empty() {
            debug!("empty secret ignored");
            return;
        }
        let credential = match room.map(str::trim).filter(|r| !r.is_empty()) {
            Some(room) => Credential::for_room(secret, room),
            None => Credential::new(secret),
        };

        self.last_error = None;
        self.submitted = Some(credential.clone());
        if self.control.authenticate(credential).is_err() {
            warn!("channel is gone; secret not submitted");
            return;
        }
        if !self.link.is_connected() && self.control.connect().is_err() {
            warn!("channel is gone; connect not attempted");
        }
    }

    /// Ends the session: wipes the store, forgets the credential, and
    /// returns to the prompt. The channel itself stays up.
    pub fn logout(&mut self) {
        info!("session ended by user");
        self.store.clear();
        if self.control.logout().is_err() {
            warn!("channel is gone; logout was local only");
        }
        self.has_ever_authenticated = false;
        self.submitted = None;
        self.last_error = None;
    }

    /// Mirrors a link-state notification from the channel.
    pub fn observe_state(&mut self, state: LinkState) {
        self.link = state;
    }

    /// Mirrors an auth event from the channel.
    pub fn observe_auth(&mut self, event: &AuthEvent) {
        match event {
            AuthEvent::Granted => {
                self.has_ever_authenticated = true;
                self.last_error = None;
                if let Some(credential) = self.submitted.take() {
                    self.store.save(&credential);
                }
            }
            AuthEvent::Denied { reason } => {
                self.has_ever_authenticated = false;
                self.last_error = Some(reason.clone());
                self.submitted = None;
                self.store.clear();
            }
            AuthEvent::Pending | AuthEvent::Reset => {}
        }
    }

    /// What the UI should show right now.
    pub fn posture(&self) -> Posture {
        if !self.has_ever_authenticated
            || self.link == LinkState::Connected(AuthPhase::Failed)
        {
            return Posture::Prompt;
        }
        Posture::Content {
            reconnecting: self.link
                != LinkState::Connected(AuthPhase::Authenticated),
        }
    }

    /// Human-readable connection status for a status bar.
    pub fn status_label(&self) -> String {
        match self.link {
            LinkState::Disconnected => "offline".to_string(),
            LinkState::Connecting => "connecting".to_string(),
            LinkState::Connected(AuthPhase::Unauthenticated) => {
                "connected".to_string()
            }
            LinkState::Connected(AuthPhase::Pending) => {
                "signing in".to_string()
            }
            LinkState::Connected(AuthPhase::Authenticated) => {
                "in room".to_string()
            }
            LinkState::Connected(AuthPhase::Failed) => {
                "sign-in failed".to_string()
            }
            LinkState::Reconnecting { attempt } => {
                format!("reconnecting (attempt {attempt})")
            }
            LinkState::Failed => "connection lost".to_string(),
        }
    }

    /// The verbatim reason of the last denial, until the next attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether any session was ever granted (or resumed from storage).
    pub fn has_session(&self) -> bool {
        self.has_ever_authenticated
    }

    /// The mirrored link state.
    pub fn link(&self) -> LinkState {
        self.link
    }
}
