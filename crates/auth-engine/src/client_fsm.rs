//! Client session lifecycle as an explicit state machine.
//!
//! ```text
//!             SignInAttempt              SignInSuccess
//!  SignedOut ──────────────► SigningIn ─────────────► SignedIn ◄──┐
//!     ▲  ▲                     │  │ SignInAborted       ▲  │       │ RefreshSuccess
//!     │  │        SignInFailed │  └─────────────────────┘  │       │ RefreshAborted
//!     │  └─────────────────────┘         RefreshStarted    ▼       │
//!     │◄──────────────── RefreshFailed ─────────────── Refreshing ─┘
//!     │
//!     └───── SignOutComplete ───── SigningOut ◄── SignOutRequested (any other state)
//! ```
//!
//! `SessionEstablished` (a session obtained outside of a password sign-in:
//! sign-up, email confirmation, redirect or restore) leads to `SignedIn`
//! from `SignedOut`, `SigningIn` and `SignedIn`. A sign-in may be started
//! from any state.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub client_machine(SignedOut)

    SignedOut => {
        SignInAttempt => SigningIn,
        SessionEstablished => SignedIn,
        SignOutRequested => SigningOut
    },
    SigningIn => {
        SignInAttempt => SigningIn,
        SignInSuccess => SignedIn,
        SessionEstablished => SignedIn,
        SignInFailed => SignedOut,
        // Rejected while an earlier session is still held.
        SignInAborted => SignedIn,
        SignOutRequested => SigningOut
    },
    SignedIn => {
        SignInAttempt => SigningIn,
        SignInSuccess => SignedIn,
        SessionEstablished => SignedIn,
        RefreshStarted => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSuccess => SignedIn,
        // Transient failure: the old session is kept.
        RefreshAborted => SignedIn,
        RefreshFailed => SignedOut,
        SignInAttempt => SigningIn,
        SignOutRequested => SigningOut
    },
    SigningOut => {
        SignOutComplete => SignedOut,
        SignInAttempt => SigningIn
    }
}

pub use client_machine::Input as ClientMachineInput;
pub use client_machine::State as ClientMachineState;
pub use client_machine::StateMachine as ClientMachine;

/// Externally visible client auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthState {
    SignedOut,
    SigningIn,
    SignedIn,
    Refreshing,
    SigningOut,
}

impl ClientAuthState {
    /// Returns true if a session is held (SignedIn or Refreshing).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ClientAuthState::SignedIn | ClientAuthState::Refreshing)
    }

    /// Returns true while a provider call is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientAuthState::SigningIn | ClientAuthState::Refreshing | ClientAuthState::SigningOut
        )
    }
}

impl From<&ClientMachineState> for ClientAuthState {
    fn from(state: &ClientMachineState) -> Self {
        match state {
            ClientMachineState::SignedOut => ClientAuthState::SignedOut,
            ClientMachineState::SigningIn => ClientAuthState::SigningIn,
            ClientMachineState::SignedIn => ClientAuthState::SignedIn,
            ClientMachineState::Refreshing => ClientAuthState::Refreshing,
            ClientMachineState::SigningOut => ClientAuthState::SigningOut,
        }
    }
}
